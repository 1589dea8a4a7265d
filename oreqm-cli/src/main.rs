mod cli;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use oreqm_core::{
    get_settings_path, ContextSnapshot, ProblemKind, SafetyRules, SequentialPalette, Session,
    Settings,
};

use crate::cli::{Cli, Command, ModeArg};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings_path = match &cli.settings {
        Some(path) => path.clone(),
        None => get_settings_path()?,
    };
    log::debug!("settings file: {:?}", settings_path);
    let settings = Settings::load_or_default(&settings_path)?;

    match cli.command {
        Command::Render {
            main,
            reference,
            search,
            mode,
            exclude_doctypes,
            exclude_ids,
            limit_depth,
            output,
            context,
            save_context,
        } => {
            let options = RenderArgs {
                main,
                reference,
                search,
                mode,
                exclude_doctypes,
                exclude_ids,
                limit_depth,
                context,
                save_context,
            };
            render_graph(settings, options, output.as_deref())?;
        }
        Command::Doctypes {
            main,
            safety,
            output,
        } => {
            render_doctypes(settings, &main, safety, output.as_deref())?;
        }
        Command::Search {
            main,
            mode,
            pattern,
        } => {
            search_records(settings, &main, mode, &pattern)?;
        }
        Command::Diff { main, reference } => {
            diff_files(settings, &main, &reference)?;
        }
        Command::Problems { main } => {
            show_problems(settings, &main)?;
        }
        Command::ValidateRules { file } => {
            validate_rules(&file)?;
        }
    }

    Ok(())
}

struct RenderArgs {
    main: Option<PathBuf>,
    reference: Option<PathBuf>,
    search: Option<String>,
    mode: ModeArg,
    exclude_doctypes: Vec<String>,
    exclude_ids: Vec<String>,
    limit_depth: bool,
    context: Option<PathBuf>,
    save_context: Option<PathBuf>,
}

fn open_session(settings: Settings, main: &Path) -> Result<Session> {
    let mut session = Session::new(settings);
    session
        .load_main_file(main)
        .with_context(|| format!("Failed to load {:?}", main))?;
    Ok(session)
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Folds the command line over a saved (or fresh) context. Files given on
/// the command line replace the ones in the snapshot; exclusions add to it.
fn merge_render_args(ctx: &mut ContextSnapshot, args: &RenderArgs) {
    if let Some(path) = &args.main {
        ctx.main_file = Some(path.clone());
    }
    if let Some(path) = &args.reference {
        ctx.reference_file = Some(path.clone());
    }
    if let Some(pattern) = &args.search {
        ctx.search_mode = args.mode.into();
        ctx.search_pattern = pattern.clone();
    }
    if args.limit_depth {
        ctx.limit_depth = true;
    }
    ctx.excluded_doctypes
        .extend(args.exclude_doctypes.iter().cloned());
    ctx.excluded_ids.extend(args.exclude_ids.iter().cloned());
}

fn render_graph(settings: Settings, args: RenderArgs, output: Option<&Path>) -> Result<()> {
    let mut session = Session::new(settings);

    let mut ctx = match &args.context {
        Some(path) => ContextSnapshot::load(path)?,
        None => session.context(),
    };
    merge_render_args(&mut ctx, &args);
    if ctx.main_file.is_none() {
        anyhow::bail!("No .oreqm file given (pass a file or --context)");
    }
    session
        .restore_context(&ctx)
        .context("Failed to set up the session")?;

    let palette = SequentialPalette::new();
    let mut on_limit = |max: usize| {
        eprintln!(
            "{}",
            format!("Selection limited to {} nodes", max).yellow()
        );
    };
    let out = session
        .render(&palette, &mut on_limit)
        .ok_or_else(|| anyhow!("Nothing to render"))?;
    write_output(output, &out.text)?;
    eprintln!("{} nodes rendered", out.node_count.to_string().bold());

    if let Some(path) = &args.save_context {
        session.context().save(path)?;
    }
    Ok(())
}

fn render_doctypes(settings: Settings, main: &Path, safety: bool, output: Option<&Path>) -> Result<()> {
    let session = open_session(settings, main)?;
    let palette = SequentialPalette::new();
    let out = session
        .render_doctypes(&palette, safety)
        .ok_or_else(|| anyhow!("Nothing to render"))?;
    write_output(output, &out.text)?;

    for problem in &out.violations {
        eprintln!("{} {}", "Not compliant:".red(), problem.message);
    }
    Ok(())
}

fn search_records(settings: Settings, main: &Path, mode: ModeArg, pattern: &str) -> Result<()> {
    let mut session = open_session(settings, main)?;
    let hits = session
        .search(mode.into(), pattern)
        .map_err(|e| anyhow!("Invalid search pattern: {}", e))?;

    if hits.is_empty() {
        println!("{}", "No matching records".yellow());
        return Ok(());
    }
    for key in &hits {
        println!("{}", key);
    }
    eprintln!("{} records", hits.len().to_string().bold());
    Ok(())
}

fn diff_files(settings: Settings, main: &Path, reference: &Path) -> Result<()> {
    let mut session = open_session(settings, main)?;
    session
        .load_reference_file(reference)
        .with_context(|| format!("Failed to load reference {:?}", reference))?;
    let store = session
        .main()
        .ok_or_else(|| anyhow!("No main document loaded"))?;

    println!("{}:", "New".green());
    for key in store.new_keys() {
        println!("  {}", key.green());
    }
    println!("{}:", "Changed".yellow());
    for key in store.changed_keys() {
        println!("  {}", key.yellow());
    }
    println!("{}:", "Removed".red());
    for key in store.removed_keys() {
        println!("  {}", key.red());
    }
    println!(
        "\n{} new, {} changed, {} removed",
        store.new_keys().len(),
        store.changed_keys().len(),
        store.removed_keys().len()
    );
    Ok(())
}

fn show_problems(settings: Settings, main: &Path) -> Result<()> {
    let session = open_session(settings, main)?;
    let store = session
        .main()
        .ok_or_else(|| anyhow!("No main document loaded"))?;
    let problems = store.problems();

    if problems.is_empty() {
        println!("{}", "No problems found".green());
        return Ok(());
    }
    for problem in problems.iter() {
        let kind = match problem.kind {
            ProblemKind::SafetyViolation | ProblemKind::DanglingReference => {
                problem.kind.to_string().red()
            }
            _ => problem.kind.to_string().yellow(),
        };
        println!("[{}] {}", kind, problem.message);
    }
    println!("\n{} problems", problems.len());
    Ok(())
}

fn validate_rules(file: &Path) -> Result<()> {
    let content =
        fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {:?}", file))?;
    let rules = doc
        .get("safety_rules")
        .ok_or_else(|| anyhow!("{:?} has no safety_rules list", file))?;
    let values: Vec<serde_json::Value> = match serde_json::to_value(rules)? {
        serde_json::Value::Array(values) => values,
        other => anyhow::bail!("safety_rules must be a list, found {}", other),
    };

    match SafetyRules::from_values(&values) {
        Ok(rules) => {
            println!("{} {} rules", "Valid:".green(), rules.len());
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Invalid:".red(), e.rule);
            Err(anyhow!(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oreqm_core::SearchMode;

    fn render_args() -> RenderArgs {
        RenderArgs {
            main: None,
            reference: None,
            search: None,
            mode: ModeArg::Text,
            exclude_doctypes: Vec::new(),
            exclude_ids: Vec::new(),
            limit_depth: false,
            context: None,
            save_context: None,
        }
    }

    fn saved_context() -> ContextSnapshot {
        let mut ctx = Session::default().context();
        ctx.main_file = Some(PathBuf::from("old.oreqm"));
        ctx.reference_file = Some(PathBuf::from("ref.oreqm"));
        ctx.search_mode = SearchMode::Vql;
        ctx.search_pattern = "dt:swrs".to_string();
        ctx.excluded_doctypes.insert("test".to_string());
        ctx
    }

    #[test]
    fn test_main_file_replaces_only_main_in_context() {
        let mut ctx = saved_context();
        let mut args = render_args();
        args.main = Some(PathBuf::from("new.oreqm"));
        merge_render_args(&mut ctx, &args);

        assert_eq!(ctx.main_file, Some(PathBuf::from("new.oreqm")));
        assert_eq!(ctx.reference_file, Some(PathBuf::from("ref.oreqm")));
        assert_eq!(ctx.search_mode, SearchMode::Vql);
        assert_eq!(ctx.search_pattern, "dt:swrs");
    }

    #[test]
    fn test_command_line_exclusions_extend_context() {
        let mut ctx = saved_context();
        let mut args = render_args();
        args.exclude_doctypes = vec!["impl".to_string()];
        args.exclude_ids = vec!["swdd.a".to_string()];
        args.limit_depth = true;
        args.search = Some("^swrs".to_string());
        args.mode = ModeArg::Id;
        merge_render_args(&mut ctx, &args);

        let doctypes: Vec<&str> = ctx.excluded_doctypes.iter().map(String::as_str).collect();
        assert_eq!(doctypes, vec!["impl", "test"]);
        assert!(ctx.excluded_ids.contains("swdd.a"));
        assert!(ctx.limit_depth);
        assert_eq!(ctx.search_mode, SearchMode::IdOnly);
        assert_eq!(ctx.search_pattern, "^swrs");
    }
}
