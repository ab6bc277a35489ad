//! Config subcommand handlers.

use std::io::{self, BufRead, IsTerminal};

use keafly_config::{Config, MachineProfile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

fn config_file(global: &GlobalOpts) -> std::path::PathBuf {
    global.config.clone().unwrap_or_else(keafly_config::config_path)
}

/// Copy of `cfg` with every plaintext password masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for machine in cfg.profiles.values_mut().flat_map(|p| p.machines.iter_mut()) {
        if machine.password.is_some() {
            machine.password = Some("****".into());
        }
    }
    cfg
}

fn read_password(prompt: &str) -> Result<String, CliError> {
    let password = if io::stdin().is_terminal() {
        rpassword::prompt_password(prompt)?
    } else {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_owned()
    };
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(password)
}

fn find_machine<'a>(
    cfg: &'a Config,
    profile: &str,
    address: &str,
    port: u16,
) -> Result<&'a MachineProfile, CliError> {
    keafly_config::find_profile(cfg, profile)?
        .machines
        .iter()
        .find(|m| m.address == address && m.agent_port == port)
        .ok_or_else(|| CliError::NotFound {
            resource_type: "machine".into(),
            identifier: format!("{address}:{port}"),
        })
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&super::load_config(global)?);
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::Internal(format!("failed to render config: {e}")))?,
                format => output::render_value(format, &cfg)?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = super::load_config(global)?;
            let default = keafly_config::active_profile_name(None, &cfg);
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured in {}", config_file(global).display());
            }
            let lines: Vec<String> = cfg
                .profiles
                .iter()
                .map(|(name, p)| {
                    let marker = if *name == default { " *" } else { "" };
                    format!("{name}{marker}\t{} machines", p.machines.len())
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let path = config_file(global);
            let mut cfg = super::load_config(global)?;
            keafly_config::find_profile(&cfg, &name)?;
            cfg.default_profile = Some(name.clone());
            keafly_config::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetPassword { address, port } => {
            let cfg = super::load_config(global)?;
            let profile = keafly_config::active_profile_name(global.profile.as_deref(), &cfg);
            let machine = find_machine(&cfg, &profile, &address, port)?;
            let password = read_password(&format!("Password for {}: ", machine.endpoint()))?;
            keafly_config::store_password(&profile, machine, &password)?;
            if !global.quiet {
                eprintln!("Password for {} stored in the system keyring", machine.endpoint());
            }
            Ok(())
        }
    }
}
