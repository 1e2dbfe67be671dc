//! wego CLI
//!
//! Manages applications and cluster automation in a GitOps config
//! repository.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use wego::gitops::automation::{
    AutomationGenerator, ClusterAutomationParams, ConfiguredBranch, FluxCli, GitopsToolkit,
    RepoUrl, RepositoryVisibility,
};
use wego::gitops::fetcher::DecodedFile;
use wego::gitops::{
    AppStore, Application, ArtifactDescriptor, ArtifactFetcher, ChangeSet, CommitOutcome,
    Component, ComponentKind, CreateInput, File, GitWriter, ObjectKey, RepositoryCache,
};
use wego::Settings;

#[derive(Debug, Parser)]
#[command(name = "wego", version, about = "GitOps repository state engine")]
struct Cli {
    /// Settings file. Defaults to `<config dir>/wego/settings.yaml`.
    #[arg(long, global = true, env = "WEGO_CONFIG")]
    config: Option<PathBuf>,

    /// Config repository URL, overriding the settings file.
    #[arg(long, global = true, env = "WEGO_REPOSITORY")]
    repository: Option<String>,

    /// Branch to work on, overriding the settings file.
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Commit locally without pushing.
    #[arg(long, global = true)]
    no_push: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage applications.
    #[command(subcommand)]
    App(AppCommand),

    /// Manage the components of an application.
    #[command(subcommand)]
    Component(ComponentCommand),

    /// Generate and commit a cluster's automation manifests.
    Install(InstallArgs),

    /// Add the app and runtime manifests to an existing Flux bootstrap.
    InstallToolkit(InstallToolkitArgs),

    /// Download an artifact and print its decoded entries as JSON.
    Fetch(FetchArgs),
}

#[derive(Debug, Subcommand)]
enum AppCommand {
    /// Create an application.
    Create {
        name: String,
        #[arg(long, default_value = "default")]
        namespace: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        display_name: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// List applications.
    List,
    /// Show one application.
    Get { name: String },
    /// Remove an application and all of its files.
    Remove {
        name: String,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ComponentCommand {
    /// Add or replace a component from a YAML file.
    Add {
        app: String,
        #[arg(long)]
        kind: ComponentKind,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove a component.
    Remove {
        app: String,
        #[arg(long)]
        kind: ComponentKind,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "default")]
        namespace: String,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Args)]
struct InstallArgs {
    #[arg(long)]
    cluster: String,
    /// Config repository URL the cluster syncs from. Defaults to the
    /// working repository.
    #[arg(long)]
    config_url: Option<String>,
    #[arg(long, default_value = "wego-system")]
    namespace: String,
    #[arg(long, value_parser = parse_visibility, default_value = "private")]
    visibility: RepositoryVisibility,
    #[arg(long)]
    create_namespace: bool,
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    app_version: String,
    /// Path to the `flux` binary.
    #[arg(long, default_value = "flux")]
    flux: PathBuf,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct InstallToolkitArgs {
    /// Directory holding the cluster's `gotk-sync.yaml`, relative to the
    /// repository root.
    #[arg(long)]
    toolkit_dir: String,
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    app_version: String,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct FetchArgs {
    url: String,
    /// Keep entries matched by the default exclusions.
    #[arg(long)]
    no_exclusions: bool,
    /// Fold the entries into applications instead of printing them.
    #[arg(long)]
    apps: bool,
}

fn parse_visibility(value: &str) -> Result<RepositoryVisibility, String> {
    match value.to_lowercase().as_str() {
        "public" => Ok(RepositoryVisibility::Public),
        "private" => Ok(RepositoryVisibility::Private),
        "internal" => Ok(RepositoryVisibility::Internal),
        other => Err(format!("unknown visibility: {}", other)),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("WEGO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    // Bridge `log` records from dependencies.
    let _ = tracing_log::LogTracer::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut settings =
        Settings::load_or_default(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(repository) = &cli.repository {
        settings.git.repository = repository.clone();
    }
    if let Some(branch) = &cli.branch {
        settings.git.branch = branch.clone();
    }
    if cli.no_push {
        settings.git.push = false;
    }
    settings.validate()?;

    match cli.command {
        Command::Fetch(args) => fetch(&settings, args).await,
        command => {
            let cache = RepositoryCache::from_settings(&settings.git);
            let store = open_store(&settings, &cache).await?;
            let result = run(&settings, &store, command).await;
            cache.evict_all();
            result
        }
    }
}

async fn open_store(settings: &Settings, cache: &RepositoryCache) -> Result<AppStore> {
    if settings.git.repository.is_empty() {
        bail!("No repository configured; set git.repository or pass --repository");
    }
    let handle = cache
        .get(&settings.git.auth, &settings.git.repository, &settings.git.branch)
        .await?;
    let writer = GitWriter::from_settings(&settings.git);
    Ok(AppStore::new(handle, writer).with_layout(settings.layout()))
}

async fn run(settings: &Settings, store: &AppStore, command: Command) -> Result<()> {
    match command {
        Command::App(AppCommand::Create {
            name,
            namespace,
            description,
            display_name,
            dry_run,
        }) => {
            let input = CreateInput {
                name,
                namespace,
                description,
                display_name,
            };
            let created = store.create(input, dry_run).await?;
            report(&created.changes, created.outcome.as_ref());
            println!("{}", created.value.id);
        }
        Command::App(AppCommand::List) => {
            for app in store.list()? {
                println!("{}\t{}\t{}", app.name, app.namespace, app.component_count());
            }
        }
        Command::App(AppCommand::Get { name }) => print_app(&store.get(&name)?)?,
        Command::App(AppCommand::Remove { name, dry_run }) => {
            match store.remove(&name, dry_run).await? {
                Some(removed) => report(&removed.changes, removed.outcome.as_ref()),
                None => println!("App {} not found; nothing to remove", name),
            }
        }
        Command::Component(ComponentCommand::Add {
            app,
            kind,
            file,
            dry_run,
        }) => {
            let data = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let component = Component::from_yaml(kind, &data)
                .with_context(|| format!("Failed to decode {} from {}", kind, file.display()))?;
            let updated = store.add_component(&app, component, dry_run).await?;
            report(&updated.changes, updated.outcome.as_ref());
        }
        Command::Component(ComponentCommand::Remove {
            app,
            kind,
            name,
            namespace,
            dry_run,
        }) => {
            let key = ObjectKey::new(name, namespace);
            let updated = store.remove_component(&app, kind, &key, dry_run).await?;
            report(&updated.changes, updated.outcome.as_ref());
        }
        Command::Install(args) => {
            let raw_url = args.config_url.as_deref().unwrap_or(&settings.git.repository);
            let config_url = RepoUrl::parse(raw_url)?;

            let generator = AutomationGenerator::new(
                Arc::new(ConfiguredBranch(settings.git.branch.clone())),
                Arc::new(FluxCli::new(args.flux)),
            )
            .with_layout(settings.layout());
            let params = ClusterAutomationParams {
                cluster_name: args.cluster,
                config_url,
                branch: None,
                namespace: args.namespace,
                visibility: args.visibility,
                create_namespace: args.create_namespace,
                version: args.app_version,
            };
            let automation = generator.generate_cluster_automation(&params).await?;
            let installed = store.install(&automation, args.dry_run).await?;
            report(&installed.changes, installed.outcome.as_ref());
        }
        Command::InstallToolkit(args) => {
            let files = read_toolkit_files(store, &args.toolkit_dir)?;
            let toolkit = GitopsToolkit::from_files(&files)?;
            let installed = store
                .install_toolkit(&toolkit, &args.app_version, args.dry_run)
                .await?;
            report(&installed.changes, installed.outcome.as_ref());
        }
        Command::Fetch(args) => fetch(settings, args).await?,
    }
    Ok(())
}

async fn fetch(settings: &Settings, args: FetchArgs) -> Result<()> {
    let fetcher = ArtifactFetcher::from_settings(&settings.fetcher)?;
    let exclusions = if args.no_exclusions {
        Vec::new()
    } else {
        settings.fetcher.exclusions.clone()
    };
    let descriptor = ArtifactDescriptor::new(args.url).with_exclusions(exclusions);
    let files: Vec<DecodedFile> = fetcher.fetch(&descriptor).await?;

    if args.apps {
        let apps = wego::gitops::fetcher::applications_from_artifact(&files, &settings.layout())?;
        for app in apps.values() {
            print_app(app)?;
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&files)?);
    }
    Ok(())
}

fn read_toolkit_files(store: &AppStore, dir: &str) -> Result<Vec<File>> {
    let root = store.handle().working_dir();
    let prefix = format!("{}/", dir.trim_matches('/'));
    let mut files = Vec::new();
    for path in wego::gitops::walk_paths(root)? {
        if path.starts_with(&prefix) {
            let data = std::fs::read(root.join(&path))
                .with_context(|| format!("Failed to read {}", path))?;
            files.push(File::new(path, data));
        }
    }
    Ok(files)
}

fn print_app(app: &Application) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&app.descriptor())?);
    for component in app.components() {
        println!("  {} {}", component.kind(), component.key());
    }
    Ok(())
}

fn report(changes: &ChangeSet, outcome: Option<&CommitOutcome>) {
    for file in &changes.written {
        println!("write  {}", file.path);
    }
    for file in &changes.removed {
        println!("remove {}", file.path);
    }
    match outcome {
        None => println!("Dry run; nothing committed"),
        Some(CommitOutcome::NothingToCommit) => println!("Nothing to commit"),
        Some(CommitOutcome::Committed {
            commit_id, pushed, ..
        }) => {
            let suffix = if *pushed { " (pushed)" } else { "" };
            println!("Committed {}{}", commit_id, suffix);
        }
    }
}
