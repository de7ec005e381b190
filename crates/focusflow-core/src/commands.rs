use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::app::{App, Outcome, ViewEvent};
use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::Persistence;
use crate::filter::Selector;
use crate::kv::{FileKvStore, KeyValueStore};
use crate::render::Renderer;
use crate::task::{Category, Priority, normalize_id};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "toggle",
        "done",
        "delete",
        "list",
        "summary",
        "categories",
        "shell",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

type Session<S> = App<S, Renderer>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Opens a session over `data_dir`, runs one invocation and disposes the
/// session (finalizing any pending removals).
#[instrument(skip(cfg, inv, input, out), fields(command = %inv.command))]
pub fn dispatch<R: BufRead, W: Write>(
    cfg: &Config,
    data_dir: &Path,
    inv: Invocation,
    input: R,
    out: &mut W,
) -> anyhow::Result<()> {
    let kv = FileKvStore::open(data_dir)
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
    let renderer = Renderer::new(cfg);
    let mut app = App::open(Persistence::new(kv), renderer, cfg.removal_delay()?);

    let result = if inv.command == "shell" {
        run_shell(&mut app, cfg, input, out)
    } else {
        execute(&mut app, cfg, &inv.command, &inv.command_args, Utc::now(), out).map(|_| ())
    };

    app.dispose();
    result
}

#[instrument(skip(app, cfg, args, now, out))]
fn execute<S: KeyValueStore, W: Write>(
    app: &mut Session<S>,
    cfg: &Config,
    command: &str,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<Flow> {
    debug!(?args, "executing command");

    match command {
        "add" => cmd_add(app, cfg, args, now, out)?,
        "toggle" | "done" => cmd_toggle(app, args, now, out)?,
        "delete" => cmd_delete(app, args, now, out)?,
        "list" => cmd_list(app, args, now, out)?,
        "summary" => cmd_summary(app, out)?,
        "categories" => cmd_categories(app, cfg, out)?,
        "help" => cmd_help(out)?,
        "version" => writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?,
        "quit" | "exit" => return Ok(Flow::Quit),
        "shell" => bail!("already in a shell session"),
        other => bail!("unknown command: {other}"),
    }

    Ok(Flow::Continue)
}

fn cmd_add<S: KeyValueStore, W: Write>(
    app: &mut Session<S>,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    let mut category = cfg.default_category();
    let mut priority = cfg.default_priority()?;
    let mut words = Vec::new();

    for arg in args {
        if let Some((key, value)) = arg.split_once(':') {
            match key {
                "category" | "cat" => {
                    category = Category::from(value);
                    continue;
                }
                "priority" | "pri" => {
                    priority = value.parse::<Priority>()?;
                    continue;
                }
                _ => {}
            }
        }
        words.push(arg.as_str());
    }

    let allowed = cfg.categories();
    if !allowed.contains(&category) {
        let names: Vec<&str> = allowed.iter().map(Category::as_str).collect();
        bail!(
            "unknown category '{category}' (expected one of: {})",
            names.join(", ")
        );
    }

    let event = ViewEvent::Submit {
        text: words.join(" "),
        category,
        priority,
    };
    match app.handle_at(event, now) {
        Outcome::Created(task) => writeln!(out, "Created {}.", task.id)?,
        _ => writeln!(out, "Nothing added: task text is empty.")?,
    }
    Ok(())
}

fn cmd_toggle<S: KeyValueStore, W: Write>(
    app: &mut Session<S>,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command toggle");

    for id in task_ids("toggle", args)? {
        match app.handle_at(ViewEvent::Toggle(id.clone()), now) {
            Outcome::Toggled {
                id,
                completed: true,
            } => writeln!(out, "Completed {id}.")?,
            Outcome::Toggled {
                id,
                completed: false,
            } => writeln!(out, "Reopened {id}.")?,
            _ => {
                warn!(%id, "toggle of unknown task");
                writeln!(out, "No task {id}.")?;
            }
        }
    }
    Ok(())
}

fn cmd_delete<S: KeyValueStore, W: Write>(
    app: &mut Session<S>,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command delete");

    for id in task_ids("delete", args)? {
        match app.handle_at(ViewEvent::Delete(id.clone()), now) {
            Outcome::Deleted(task) => writeln!(out, "Deleted {} '{}'.", task.id, task.text)?,
            _ => {
                warn!(%id, "delete of unknown task");
                writeln!(out, "No task {id}.")?;
            }
        }
    }
    Ok(())
}

fn cmd_list<S: KeyValueStore, W: Write>(
    app: &mut Session<S>,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");

    if args.len() > 1 {
        bail!("list takes at most one selector");
    }
    if let Some(raw) = args.first() {
        app.handle_at(ViewEvent::Filter(Selector::parse(raw)), now);
    }

    writeln!(out, "Filter: {}", app.sync().filter())?;
    app.view().write_to(&mut *out)?;
    Ok(())
}

fn cmd_summary<S: KeyValueStore, W: Write>(
    app: &Session<S>,
    out: &mut W,
) -> anyhow::Result<()> {
    for (slot, value) in app.view().summary().slots() {
        writeln!(out, "{:<14} {value}", slot.label())?;
    }
    Ok(())
}

fn cmd_categories<S: KeyValueStore, W: Write>(
    app: &Session<S>,
    cfg: &Config,
    out: &mut W,
) -> anyhow::Result<()> {
    for category in cfg.categories() {
        let count = app
            .store()
            .all()
            .iter()
            .filter(|task| task.category == category)
            .count();
        writeln!(out, "{category} {count}")?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "Usage: focusflow [--rc KEY=VALUE] [--focusflowrc PATH] [--data DIR] <command> [args]\n\
         \n\
         Commands:\n  \
           add <text...> [category:<name>] [priority:low|medium|high]\n  \
           toggle <id...>      flip completion (alias: done)\n  \
           delete <id...>\n  \
           list [all|active|completed|<category>]\n  \
           summary\n  \
           categories\n  \
           shell               interactive session reading commands from stdin\n  \
           help\n  \
           version"
    )?;
    Ok(())
}

fn task_ids(command: &str, args: &[String]) -> anyhow::Result<Vec<String>> {
    if args.is_empty() {
        return Err(anyhow!("{command} requires at least one task id"));
    }
    Ok(args.iter().map(|raw| normalize_id(raw)).collect())
}

/// Line-oriented session: each input line is one command against the
/// same open session. Pending removals advance on wall-clock time
/// between lines.
#[instrument(skip_all)]
fn run_shell<S: KeyValueStore, R: BufRead, W: Write>(
    app: &mut Session<S>,
    cfg: &Config,
    input: R,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("starting shell session");
    app.view().write_to(&mut *out)?;

    for line in input.lines() {
        let line = line.context("failed reading shell input")?;
        let now = Utc::now();
        app.tick(now);

        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let Some((first, args)) = tokens.split_first() else {
            continue;
        };

        let command = match first.as_str() {
            "quit" | "exit" => "quit",
            "filter" => "list",
            token => match expand_command_abbrev(token, &known_command_names()) {
                Some(command) => command,
                None => {
                    writeln!(out, "unknown command: {token}")?;
                    continue;
                }
            },
        };

        match execute(app, cfg, command, args, now, out) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(err) => writeln!(out, "error: {err:#}")?,
        }
    }

    info!("shell session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use tempfile::tempdir;

    use super::*;
    use crate::datastore::{COUNTER_KEY, TASKS_KEY};
    use crate::store::TaskStore;

    fn run(cfg: &Config, dir: &Path, tokens: &[&str]) -> anyhow::Result<String> {
        run_with_input(cfg, dir, tokens, "")
    }

    fn run_with_input(
        cfg: &Config,
        dir: &Path,
        tokens: &[&str],
        input: &str,
    ) -> anyhow::Result<String> {
        let tokens: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
        let inv = Invocation::from_tokens(cfg, &tokens)?;
        let mut out = Vec::new();
        dispatch(cfg, dir, inv, Cursor::new(input.to_string()), &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn stored_texts(dir: &Path) -> Vec<String> {
        let kv = FileKvStore::open(dir).unwrap();
        let store = TaskStore::open(Persistence::new(kv));
        store.all().iter().map(|t| t.text.clone()).collect()
    }

    fn cfg() -> Config {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "off".to_string())]);
        cfg
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("del", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("d", &known), None);
        assert_eq!(expand_command_abbrev("list", &known), Some("list"));
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn add_uses_modifiers_and_defaults() {
        let temp = tempdir().unwrap();
        let cfg = cfg();

        let out = run(&cfg, temp.path(), &["add", "Ship", "release", "category:work", "pri:h"]).unwrap();
        assert_eq!(out, "Created task1.\n");
        let out = run(&cfg, temp.path(), &["add", "Buy", "milk"]).unwrap();
        assert_eq!(out, "Created task2.\n");

        let kv = FileKvStore::open(temp.path()).unwrap();
        let store = TaskStore::open(Persistence::new(kv));
        let tasks = store.all();
        assert_eq!(tasks[0].category, Category::Work);
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks[1].category, Category::Personal);
        assert_eq!(tasks[1].priority, Priority::Medium);
    }

    #[test]
    fn add_rejects_unconfigured_category_and_reports_blank_text() {
        let temp = tempdir().unwrap();
        let cfg = cfg();

        assert!(run(&cfg, temp.path(), &["add", "x", "category:hobbies"]).is_err());
        assert!(run(&cfg, temp.path(), &["add", "x", "priority:urgent"]).is_err());
        let out = run(&cfg, temp.path(), &["add", "category:work"]).unwrap();
        assert_eq!(out, "Nothing added: task text is empty.\n");
        assert!(stored_texts(temp.path()).is_empty());
    }

    #[test]
    fn read_only_commands_leave_stored_files_untouched() {
        let temp = tempdir().unwrap();
        let cfg = cfg();
        let kv = FileKvStore::open(temp.path()).unwrap();
        let tasks_path = kv.path_for(TASKS_KEY).unwrap();
        let counter_path = kv.path_for(COUNTER_KEY).unwrap();

        run(&cfg, temp.path(), &["add", "category:work"]).unwrap();
        assert!(!tasks_path.exists());
        assert!(!counter_path.exists());

        let stored = r#"[{"id":"task1","text":"a","category":"work","priority":"High","completed":false}]"#;
        fs::write(&tasks_path, stored).unwrap();
        let read_only: [&[&str]; 5] = [&["version"], &["help"], &["list"], &["summary"], &["toggle", "9"]];
        for tokens in read_only {
            run(&cfg, temp.path(), tokens).unwrap();
            assert_eq!(fs::read_to_string(&tasks_path).unwrap(), stored);
        }
        assert!(!counter_path.exists());
    }

    #[test]
    fn toggle_delete_and_summary() {
        let temp = tempdir().unwrap();
        let cfg = cfg();
        run(&cfg, temp.path(), &["add", "Buy", "milk", "cat:personal", "pri:low"]).unwrap();
        run(&cfg, temp.path(), &["add", "Ship", "release", "cat:work", "pri:high"]).unwrap();

        assert_eq!(run(&cfg, temp.path(), &["done", "2"]).unwrap(), "Completed task2.\n");
        let summary = run(&cfg, temp.path(), &["summary"]).unwrap();
        assert_eq!(
            summary,
            "Completed      1\nActive         1\nHigh priority  0\n"
        );

        assert_eq!(run(&cfg, temp.path(), &["toggle", "task2"]).unwrap(), "Reopened task2.\n");
        assert_eq!(
            run(&cfg, temp.path(), &["delete", "task1", "task1"]).unwrap(),
            "Deleted task1 'Buy milk'.\nNo task task1.\n"
        );
        assert_eq!(stored_texts(temp.path()), vec!["Ship release".to_string()]);
        assert!(run(&cfg, temp.path(), &["delete"]).is_err());
    }

    #[test]
    fn list_applies_selector() {
        let temp = tempdir().unwrap();
        let cfg = cfg();
        run(&cfg, temp.path(), &["add", "Buy", "milk", "cat:personal"]).unwrap();
        run(&cfg, temp.path(), &["add", "Ship", "release", "cat:work"]).unwrap();

        let out = run(&cfg, temp.path(), &["list", "work"]).unwrap();
        assert!(out.starts_with("Filter: work\n"));
        assert!(out.contains("Ship release"));
        assert!(!out.contains("Buy milk"));

        let out = run(&cfg, temp.path(), &["list", "completed"]).unwrap();
        assert!(out.contains("No tasks."));

        let out = run(&cfg, temp.path(), &[]).unwrap();
        assert!(out.starts_with("Filter: all\n"));
        assert!(out.contains("Buy milk"));
    }

    #[test]
    fn categories_lists_counts() {
        let temp = tempdir().unwrap();
        let mut cfg = cfg();
        cfg.apply_overrides(vec![("categories".to_string(), "errands".to_string())]);
        run(&cfg, temp.path(), &["add", "Post", "letter", "cat:errands"]).unwrap();

        let out = run(&cfg, temp.path(), &["categories"]).unwrap();
        assert_eq!(out, "work 0\npersonal 0\ngoals 0\nerrands 1\n");
    }

    #[test]
    fn shell_session_runs_commands_until_quit() {
        let temp = tempdir().unwrap();
        let cfg = cfg();
        let script = "add Buy milk\n\
                      add Ship release cat:work pri:high\n\
                      \n\
                      bogus\n\
                      toggle\n\
                      done 2\n\
                      filter active\n\
                      quit\n\
                      add never runs\n";

        let out = run_with_input(&cfg, temp.path(), &["shell"], script).unwrap();
        assert!(out.contains("Created task1."));
        assert!(out.contains("Created task2."));
        assert!(out.contains("unknown command: bogus"));
        assert!(out.contains("error: toggle requires at least one task id"));
        assert!(out.contains("Completed task2."));
        assert!(out.contains("Filter: active"));
        assert_eq!(
            stored_texts(temp.path()),
            vec!["Buy milk".to_string(), "Ship release".to_string()]
        );
    }
}
