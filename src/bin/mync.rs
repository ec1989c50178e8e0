// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use mync::{
    catalog::{Added, CatalogError, SettingCatalog},
    config::{split_listing, Setting},
    console::{Console, IndicatifConsole, Level},
    context::{Context, StorageChange},
    path::default_config_path,
    sync::{
        outcome::{Outcome, Report, SkipReason},
        triple::expand,
        EngineError, Overwrite,
    },
};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, process::exit, process::Command as Process, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "mync [options] <mync-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file to use instead of the default.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };

        match self.command {
            Command::Config(opts) => run_config(config_path, opts),
            command => {
                let first_run = !config_path.exists();
                let mut context = Context::load(config_path)?;
                let console = spinner_console()?;
                let result = match command {
                    Command::Setup => run_setup(&mut context, &console),
                    command if first_run => run_setup(&mut context, &console)
                        .and_then(|_| run_with_context(command, &mut context, &console)),
                    command => run_with_context(command, &mut context, &console),
                };
                console.bar().finish_and_clear();
                result
            }
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Choose storage location interactively.
    #[command(override_usage = "mync setup [options]")]
    Setup,

    /// Show or change storage location.
    #[command(override_usage = "mync storage [options] [<path>]")]
    Storage(StorageOptions),

    /// Open configuration file in editor.
    #[command(override_usage = "mync config [options]")]
    Config(ConfigOptions),

    /// List names of all settings.
    #[command(override_usage = "mync list [options]")]
    List,

    /// Show resolved paths of setting.
    #[command(override_usage = "mync info [options] <name>")]
    Info(InfoOptions),

    /// Add new setting.
    #[command(override_usage = "mync add [options] [<name> <source> <destination>]")]
    Add(AddOptions),

    /// Remove setting.
    #[command(override_usage = "mync remove [options] <name>")]
    Remove(RemoveOptions),

    /// Snapshot every destination of this machine.
    #[command(override_usage = "mync backup [options]")]
    Backup(VerboseOptions),

    /// Restore snapshot of this machine.
    #[command(override_usage = "mync restore [options]")]
    Restore(VerboseOptions),

    /// Copy destinations of this machine into storage.
    #[command(override_usage = "mync push [options]")]
    Push(CopyOptions),

    /// Copy storage onto destinations of this machine.
    #[command(override_usage = "mync pull [options]")]
    Pull(CopyOptions),

    /// Replace destinations of this machine with links into storage.
    #[command(override_usage = "mync sync [options]")]
    Sync(VerboseOptions),

    /// Replace links into storage with real copies.
    #[command(override_usage = "mync unsync [options]")]
    Unsync(VerboseOptions),

    /// Show backup and sync status of this machine.
    #[command(override_usage = "mync status [options]")]
    Status,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StorageOptions {
    /// New storage location. Contents of the current one are moved over.
    #[arg(value_name = "path")]
    pub path: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigOptions {
    /// Editor to use instead of $VISUAL or $EDITOR.
    #[arg(short, long, value_name = "program")]
    pub editor: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InfoOptions {
    /// Name of setting to show.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Name of setting.
    #[arg(value_name = "name")]
    pub name: Option<String>,

    /// Path relative to storage.
    #[arg(value_name = "source")]
    pub source: Option<String>,

    /// Path on workstation.
    #[arg(value_name = "destination")]
    pub destination: Option<String>,

    /// Comma separated files to sync individually.
    #[arg(short, long, value_name = "files")]
    pub files: Option<String>,

    /// Comma separated folders to sync individually.
    #[arg(short = 'd', long, value_name = "folders")]
    pub folders: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Name of setting to remove.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct VerboseOptions {
    /// Show outcome of every file and folder.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CopyOptions {
    /// Replace existing files and folders without asking.
    #[arg(short, long)]
    pub overwrite: bool,

    /// Show outcome of every file and folder.
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn spinner_console() -> Result<IndicatifConsole> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(IndicatifConsole::new(bar))
}

fn run_with_context(
    command: Command,
    context: &mut Context,
    console: &IndicatifConsole,
) -> Result<()> {
    match command {
        Command::Storage(opts) => run_storage(opts, context, console),
        Command::Config(opts) => run_config(context.catalog().path().into(), opts),
        Command::List => run_list(context),
        Command::Info(opts) => run_info(opts, context, console),
        Command::Add(opts) => run_add(opts, context, console),
        Command::Remove(opts) => run_remove(opts, context, console),
        Command::Backup(opts) => {
            let report = context.engine(console).backup()?;
            present("backup", &report, opts.verbose, console)
        }
        Command::Restore(opts) => {
            let result = context.engine(console).restore();
            finish("restore", result, opts.verbose, console)
        }
        Command::Push(opts) => {
            let result = context.engine(console).push(Overwrite::from(opts.overwrite));
            finish("push", result, opts.verbose, console)
        }
        Command::Pull(opts) => {
            let result = context.engine(console).pull(Overwrite::from(opts.overwrite));
            finish("pull", result, opts.verbose, console)
        }
        Command::Sync(opts) => run_sync(opts, context, console),
        Command::Unsync(opts) => {
            let result = context.engine(console).unsync();
            finish("unsync", result, opts.verbose, console)
        }
        Command::Status => run_status(context, console),
        Command::Setup => run_setup(context, console),
    }
}

fn run_setup(context: &mut Context, console: &IndicatifConsole) -> Result<()> {
    context.setup(console)?;
    Ok(())
}

fn run_config(config_path: PathBuf, opts: ConfigOptions) -> Result<()> {
    // INVARIANT: Editor always opens an existing file.
    let catalog = SettingCatalog::open(&config_path)?;

    let editor = opts
        .editor
        .or_else(|| std::env::var("VISUAL").ok())
        .or_else(|| std::env::var("EDITOR").ok())
        .filter(|editor| !editor.trim().is_empty())
        .unwrap_or_else(|| "vi".into());
    let mut words = editor.split_whitespace();
    let program = words.next().unwrap_or("vi");

    info!("open {:?} with {program}", catalog.path().display());
    let status = Process::new(program)
        .args(words)
        .arg(catalog.path())
        .spawn()?
        .wait()?;
    if !status.success() {
        return Err(anyhow!("editor {program:?} exited with {status}"));
    }

    // INVARIANT: Catch mistakes made in the editor right away.
    SettingCatalog::open(&config_path)?;

    Ok(())
}

fn run_storage(
    opts: StorageOptions,
    context: &mut Context,
    console: &IndicatifConsole,
) -> Result<()> {
    let Some(path) = opts.path else {
        println!("{}", context.storage_dir().display());
        console.report(
            Level::Log,
            &format!("configured as {:?}", context.catalog().config().storage.root),
        );
        return Ok(());
    };

    match context.set_storage(path)? {
        StorageChange::Unchanged(dir) => {
            console.report(Level::Warning, &format!("storage already set to {:?}", dir.display()));
        }
        StorageChange::Moved { from, to, moved } => {
            console.report(
                Level::Success,
                &format!("moved {moved} entries from {:?} to {:?}", from.display(), to.display()),
            );
        }
    }

    Ok(())
}

fn run_list(context: &Context) -> Result<()> {
    for name in context.catalog().list() {
        println!("{name}");
    }

    Ok(())
}

fn run_info(opts: InfoOptions, context: &Context, console: &IndicatifConsole) -> Result<()> {
    let matches = context.catalog().info(&opts.name);
    if matches.is_empty() {
        return Err(CatalogError::NotFound { name: opts.name }.into());
    }

    let storage = context.storage_dir();
    for setting in matches {
        let resolver = context.resolver();
        let lines = [
            format!("name: {}", setting.name),
            format!("source: {}", resolver.join(&storage, &setting.source).display()),
            format!("destination: {}", resolver.merge(&setting.destination).display()),
        ];
        for line in lines {
            console.report(Level::Log, &line);
        }

        if setting.is_decomposed() {
            for triple in expand(setting, resolver, &storage) {
                console.report(Level::Log, &format!("  {triple}"));
            }
        }
    }

    Ok(())
}

fn run_add(opts: AddOptions, context: &mut Context, console: &IndicatifConsole) -> Result<()> {
    let interactive = opts.name.is_none() || opts.source.is_none() || opts.destination.is_none();
    let name = answer_or_ask(opts.name, "Name of setting:", console)?;
    let source = answer_or_ask(opts.source, "Source, relative to storage:", console)?;
    let destination = answer_or_ask(opts.destination, "Destination on this workstation:", console)?;

    let (files, folders) = if interactive && opts.files.is_none() && opts.folders.is_none() {
        (
            console.ask("Files to sync individually (comma separated, may be empty):", "")?,
            console.ask("Folders to sync individually (comma separated, may be empty):", "")?,
        )
    } else {
        (opts.files.unwrap_or_default(), opts.folders.unwrap_or_default())
    };

    let setting = Setting::new(name, source, destination)
        .with_files(split_listing(&files))
        .with_folders(split_listing(&folders));
    match context.catalog_mut().add(setting, console)? {
        Added::New => console.report(Level::Success, "setting added"),
        Added::Replaced(old) => {
            console.report(Level::Success, &format!("setting replaced {} old entries", old.len()))
        }
    }

    Ok(())
}

fn answer_or_ask(
    answer: Option<String>,
    question: &str,
    console: &IndicatifConsole,
) -> Result<String> {
    match answer {
        Some(answer) => Ok(answer),
        None => Ok(console.ask(question, "")?),
    }
}

fn run_remove(
    opts: RemoveOptions,
    context: &mut Context,
    console: &IndicatifConsole,
) -> Result<()> {
    let removed = context.catalog_mut().remove(&opts.name, console)?;
    console.report(Level::Success, &format!("removed {} settings", removed.len()));

    Ok(())
}

fn run_sync(opts: VerboseOptions, context: &Context, console: &IndicatifConsole) -> Result<()> {
    let report = context.engine(console).sync()?;
    if let Some(backup) = &report.backup {
        present("backup", backup, opts.verbose, console)?;
    }

    present("sync", &report.links, opts.verbose, console)
}

fn run_status(context: &Context, console: &IndicatifConsole) -> Result<()> {
    let engine = context.engine(console);
    let status = engine.status()?;
    let backed_up = if status.backed_up { "backed up" } else { "not backed up" };
    let synced = if status.synced { "synced" } else { "not synced" };
    console.report(
        Level::Log,
        &format!(
            "machine {:?} of {:?} is {backed_up} and {synced}",
            context.machine_id(),
            context.user()
        ),
    );
    console.report(
        Level::Log,
        &format!("{} files and folders configured", engine.triples().len()),
    );

    Ok(())
}

fn finish(
    verb: &str,
    result: Result<Report, EngineError>,
    verbose: bool,
    console: &impl Console,
) -> Result<()> {
    match result {
        Ok(report) => present(verb, &report, verbose, console),
        Err(EngineError::Canceled { completed }) => {
            if verbose {
                echo(&completed, console);
            }
            Err(anyhow!(
                "{verb} canceled by user after {} of its entries",
                completed.len()
            ))
        }
        Err(error) => Err(error.into()),
    }
}

fn present(verb: &str, report: &Report, verbose: bool, console: &impl Console) -> Result<()> {
    if report.is_empty() {
        console.report(Level::Warning, &format!("{verb} had nothing to do"));
        return Ok(());
    }

    if verbose {
        echo(report, console);
    }

    let failed = report.failures().count();
    let skipped = report.len() - report.done() - failed;
    if failed > 0 {
        console.report(
            Level::Error,
            &format!("{verb} failed for {failed} of {} entries", report.len()),
        );
        return Err(anyhow!("{verb} finished with failures"));
    }

    console.report(
        Level::Success,
        &format!("{verb} finished, {} done, {skipped} skipped", report.done()),
    );

    Ok(())
}

fn echo(report: &Report, console: &impl Console) {
    for entry in report.iter() {
        let level = match &entry.outcome {
            Outcome::Done => Level::Success,
            Outcome::Skipped(SkipReason::NoSource) => Level::Log,
            Outcome::Skipped(_) => Level::Warning,
            Outcome::Failed(_) => Level::Error,
        };
        console.report(level, &format!("{}: {}", entry.triple, entry.outcome));
    }
}
