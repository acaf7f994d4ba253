use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::{ColoredString, Colorize};
use repodiff_cache::{CacheConfig, DiffCacheRegistry, EventHub, TokioScheduler};
use repodiff_engine::{GitCliEngine, VcsEngine};
use repodiff_snapshot::{Category, DiffSnapshot};
use repodiff_types::{Repository, DEFAULT_CONTROL_DIR};

use crate::cli::*;
use crate::watcher::RepoWatcher;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.debounce_ms)?;
    match cli.command {
        Command::Status(args) => cmd_status(args, cli.format),
        Command::Watch(args) => cmd_watch(args, cli.format, config),
    }
}

fn load_config(path: Option<&Path>, debounce_ms: Option<u64>) -> anyhow::Result<CacheConfig> {
    let mut config = match path {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };
    if let Some(ms) = debounce_ms {
        config.debounce_ms = ms;
    }
    Ok(config)
}

/// Find the repository containing `start` by walking up to the nearest
/// directory with a `.git` entry. A `.git` file (linked work trees,
/// submodules) is followed to the directory it names.
pub fn discover(start: &Path) -> anyhow::Result<Repository> {
    let start = start
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", start.display()))?;
    for dir in start.ancestors() {
        let marker = dir.join(DEFAULT_CONTROL_DIR);
        if marker.is_dir() {
            return Ok(Repository::new(dir, marker));
        }
        if marker.is_file() {
            let text = std::fs::read_to_string(&marker)
                .with_context(|| format!("cannot read {}", marker.display()))?;
            let Some(target) = text.trim().strip_prefix("gitdir:") else {
                bail!("{} is not a gitdir link", marker.display());
            };
            let target = PathBuf::from(target.trim());
            let control_dir = if target.is_absolute() { target } else { dir.join(target) };
            return Ok(Repository::new(dir, control_dir));
        }
    }
    bail!("not inside a git work tree: {}", start.display())
}

fn cmd_status(args: StatusArgs, format: OutputFormat) -> anyhow::Result<()> {
    let repo = discover(&args.path)?;
    let raw = GitCliEngine::new()
        .diff(&repo, None)
        .context("git status failed")?;
    raw.validate()?;
    let snapshot = DiffSnapshot::full_compute(raw);
    print_snapshot(&repo, &snapshot, format)
}

fn cmd_watch(args: WatchArgs, format: OutputFormat, config: CacheConfig) -> anyhow::Result<()> {
    let repo = discover(&args.path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start runtime")?;

    let engine = GitCliEngine::new();
    let hub = EventHub::new();
    let registry = DiffCacheRegistry::new(
        Arc::new(engine.clone()),
        Arc::new(TokioScheduler::new(runtime.handle().clone())),
        config,
    )
    .with_event_source(Arc::new(hub.clone()));

    let entry = registry.get_or_create(&repo);
    let printed = repo.clone();
    entry.add_listener(move |_, snapshot| {
        if let Err(e) = print_snapshot(&printed, snapshot, format) {
            tracing::warn!(error = %e, "cannot print snapshot");
        }
    });
    let _watcher = RepoWatcher::start(repo.clone(), hub, engine)?;

    if format == OutputFormat::Text {
        eprintln!(
            "{} {} (debounce {} ms, Ctrl-C to stop)",
            "Watching".cyan().bold(),
            repo.work_tree().display(),
            registry.config().debounce_ms
        );
    }

    runtime.block_on(async {
        match args.exit_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => tokio::signal::ctrl_c().await.context("cannot listen for Ctrl-C")?,
        }
        anyhow::Ok(())
    })?;
    registry.clear();
    Ok(())
}

fn print_snapshot(repo: &Repository, snapshot: &DiffSnapshot, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let doc = serde_json::json!({
                "repository": repo.id(),
                "work_tree": repo.work_tree(),
                "snapshot": snapshot,
            });
            println!("{}", serde_json::to_string(&doc)?);
        }
        OutputFormat::Text => {
            println!("Repository {}", repo.work_tree().display().to_string().bold());
            if snapshot.is_clean() {
                println!("{}", "Working tree clean.".green());
                return Ok(());
            }
            for category in Category::ALL {
                for path in snapshot.paths(category) {
                    println!("  {} {}", label(category), path);
                }
            }
            let ignored = snapshot.ignored_not_in_index().len();
            if ignored > 0 {
                println!("  {}", format!("({ignored} ignored)").dimmed());
            }
        }
    }
    Ok(())
}

fn label(category: Category) -> ColoredString {
    let text = format!("{:<12}", format!("{category}:"));
    match category {
        Category::Added | Category::Changed | Category::Removed => text.green(),
        Category::Modified | Category::Missing => text.red(),
        Category::Untracked => text.yellow(),
        Category::Conflicting => text.magenta().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_walks_up_to_control_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("src/deep")).unwrap();

        let repo = discover(&root.join("src/deep")).unwrap();
        assert_eq!(repo.work_tree(), root.as_path());
        assert_eq!(repo.control_dir(), root.join(".git").as_path());
    }

    #[test]
    fn discover_follows_gitdir_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("wt")).unwrap();
        std::fs::write(root.join("wt/.git"), "gitdir: ../main/.git/worktrees/wt\n").unwrap();

        let repo = discover(&root.join("wt")).unwrap();
        assert_eq!(repo.control_dir(), root.join("wt/../main/.git/worktrees/wt").as_path());
    }

    #[test]
    fn debounce_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "debounce_ms = 900\nignore_file_name = \".ignore\"\n").unwrap();

        let config = load_config(Some(&path), Some(25)).unwrap();
        assert_eq!(config.debounce_ms, 25);
        assert_eq!(config.ignore_file_name, ".ignore");
        assert_eq!(load_config(None, None).unwrap(), CacheConfig::default());
    }
}
