use anyhow::Context;
use bakeflow::ansible::{Ansible, AnsibleLogin};
use bakeflow::inventory::BUILD_GROUP;
use bakeflow::{lifecycle, provision, Stage};
use bakeflow_cloud::state::{InstanceFiles, PersistedState, WORK_DIR};
use bakeflow_cloud::wait;
use bakeflow_cloud_aws::AwsProvider;
use bakeflow_config::{BuildSpec, Config, Connection};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "bake")]
#[command(about = "Bake cloud machine images from Ansible roles", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase Ansible verbosity (repeatable, up to -vvvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the build instance and run the role against it
    Build {
        /// Instance key, "{platform}-{profile}"
        instance: String,
    },
    /// Run the test-stage playbook against the build instance
    Test {
        /// Instance key, "{platform}-{profile}"
        instance: String,
    },
    /// Snapshot the build instance into a named image
    Image {
        /// Instance key, "{platform}-{profile}"
        instance: String,
    },
    /// Tear down the instance, keypair and local files
    Clean {
        /// Instance key, "{platform}-{profile}"
        instance: String,
        /// Deregister the captured image instead of the build resources
        #[arg(long)]
        image: bool,
    },
    /// Show every configured instance and whether it exists
    Status,
    /// Open an interactive shell on the build instance
    Login {
        /// Instance key, "{platform}-{profile}"
        instance: String,
    },
    /// Check the configuration document and list what it resolves to
    Validate,
}

fn load_config() -> anyhow::Result<Config> {
    let path = bakeflow_config::find_document()?;
    Ok(bakeflow_config::load(&path)?)
}

/// Look up an instance key, listing the valid keys on a miss
fn spec_for<'a>(config: &'a Config, instance: &str, stage: Stage) -> anyhow::Result<&'a BuildSpec> {
    let spec = config.get(instance).ok_or_else(|| {
        anyhow::anyhow!(
            "no instance \"{}\" in configuration, expected one of: {}",
            instance,
            config.keys().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        )
    })?;
    Ok(match stage {
        Stage::Build => &spec.build,
        Stage::Test => &spec.test,
    })
}

/// Provision if needed, wait for login readiness, then run the playbook.
/// The playbook's exit code becomes the process exit code.
async fn converge(spec: &BuildSpec, verbosity: u8) -> anyhow::Result<i32> {
    let provider = AwsProvider::from_env().await;
    let files = InstanceFiles::new(WORK_DIR, &spec.instance_key());

    let state = provision::ensure_instance(&provider, spec, &files).await?;
    println!(
        "Instance {} at {}",
        state.build.id.cyan(),
        state.build.ip.cyan()
    );

    let deadline = Instant::now() + Duration::from_secs(spec.connection_timeout);
    let login = AnsibleLogin {
        group: BUILD_GROUP,
        inventory: &files.inventory,
    };
    wait::wait_for_connection(&state.build.ip, spec.port, deadline, &login).await?;

    let ansible = Ansible::new(verbosity);
    ansible.galaxy_install(Path::new("requirements.yml")).await?;
    ansible
        .playbook_run(&files.inventory, &files.playbook, &spec.extra_vars)
        .await
}

async fn login(spec: &BuildSpec) -> anyhow::Result<()> {
    if spec.connection == Connection::Winrm {
        anyhow::bail!("login is only supported for ssh instances");
    }

    let files = InstanceFiles::new(WORK_DIR, &spec.instance_key());
    let state = PersistedState::load(&files)?;

    let status = tokio::process::Command::new("ssh")
        .arg("-i")
        .arg(&files.keyfile)
        .args(["-l", &spec.username])
        .arg(&state.build.ip)
        .status()
        .await
        .context("failed to run ssh")?;
    std::process::exit(status.code().unwrap_or(1));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { instance } => {
            let config = load_config()?;
            let spec = spec_for(&config, &instance, Stage::Build)?;
            println!("{}", format!("Building {instance} ...").green());
            let code = converge(spec, cli.verbose).await?;
            std::process::exit(code);
        }
        Commands::Test { instance } => {
            let config = load_config()?;
            let spec = spec_for(&config, &instance, Stage::Test)?;
            println!("{}", format!("Testing {instance} ...").green());
            let code = converge(spec, cli.verbose).await?;
            std::process::exit(code);
        }
        Commands::Image { instance } => {
            let config = load_config()?;
            let spec = spec_for(&config, &instance, Stage::Build)?;
            let provider = AwsProvider::from_env().await;
            let files = InstanceFiles::new(WORK_DIR, &spec.instance_key());
            lifecycle::make_image(&provider, spec, &files).await?;
        }
        Commands::Clean { instance, image } => {
            let config = load_config()?;
            let spec = spec_for(&config, &instance, Stage::Build)?;
            let provider = AwsProvider::from_env().await;
            let files = InstanceFiles::new(WORK_DIR, &spec.instance_key());
            if image {
                lifecycle::clean_image(&provider, &files).await?;
            } else {
                lifecycle::clean_build(&provider, &files).await?;
            }
        }
        Commands::Status => {
            let config = load_config()?;
            for (key, exists) in lifecycle::statuses(&config, Path::new(WORK_DIR)) {
                let marker = if exists {
                    "created".green()
                } else {
                    "not created".dimmed()
                };
                println!("{:<30} {}", key.cyan(), marker);
            }
        }
        Commands::Login { instance } => {
            let config = load_config()?;
            let spec = spec_for(&config, &instance, Stage::Build)?;
            login(spec).await?;
        }
        Commands::Validate => {
            let path = bakeflow_config::find_document()?;
            match bakeflow_config::load(&path) {
                Ok(config) => {
                    println!("{}", format!("{} is valid", path.display()).green().bold());
                    for key in config.keys() {
                        println!("  {}", key.cyan());
                    }
                }
                Err(e) => {
                    eprintln!("{}", format!("{e}").red());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
