mod cli;

use anyhow::Context;
use hcl::Value;
use std::path::Path;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MPTF_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Transform(transform_cli) => transform(transform_cli),
        cli::Command::Reset(reset_cli) => reset(reset_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn transform(cli: cli::TransformCommand) -> anyhow::Result<()> {
    let written = mapotf::runner::transform(&cli.terraform.tf_dir, &cli.mptf.mptf_dir, cli.recursive)?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn reset(cli: cli::ResetCommand) -> anyhow::Result<()> {
    let dirs = if cli.recursive {
        mapotf::module::load_manifest(&cli.terraform.tf_dir)?
            .into_iter()
            .filter(|module| module.is_root() || module.is_local())
            .map(|module| module.abs_dir)
            .collect()
    } else {
        vec![cli.terraform.tf_dir.clone()]
    };

    for dir in dirs {
        let restored = mapotf::backup::reset(&dir).with_context(|| format!("Failed to reset {}", dir.display()))?;
        for path in restored {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (mapotf-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Blocks { terraform, output: output_args } => {
            let module = load_module(&terraform.tf_dir)?;
            let blocks = module
                .blocks()
                .iter()
                .map(|block| (block.address.clone(), mapotf::context::block_value(block)))
                .collect();
            output(&output_args, &Value::Object(blocks))?;
        }
        Order { mptf } => {
            let config = mapotf::config::Config::load(&mptf.mptf_dir)?;
            for declaration in mapotf::runner::order(&config)? {
                println!("{}", declaration.address());
            }
        }
    }

    Ok(())
}

fn load_module(dir: &Path) -> anyhow::Result<mapotf::module::Module> {
    mapotf::module::Module::load(dir).with_context(|| format!("Failed to load terraform module {}", dir.display()))
}
