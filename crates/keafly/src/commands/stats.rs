//! `stats`: pull statistics and show utilization per scope.

use serde::Serialize;
use tabled::Tabled;

use keafly_core::{Family, SharedNetwork, Subnet};

use crate::cli::{GlobalOpts, OutputFormat, StatsArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct SubnetRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Prefix")]
    prefix: String,
    #[tabled(rename = "Shared network")]
    shared_network: String,
    #[tabled(rename = "Servers")]
    servers: usize,
    #[tabled(rename = "Addresses")]
    addr: String,
    #[tabled(rename = "Prefixes")]
    pd: String,
}

#[derive(Tabled)]
struct NetworkRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Subnets")]
    subnets: usize,
    #[tabled(rename = "Addresses")]
    addr: String,
    #[tabled(rename = "Prefixes")]
    pd: String,
}

/// JSON / YAML document for `stats`.
#[derive(Serialize)]
struct StatsReport<'a> {
    subnets: &'a [Subnet],
    #[serde(skip_serializing_if = "Option::is_none")]
    shared_networks: Option<&'a [SharedNetwork]>,
    global: &'a keafly_core::model::network::Stats,
}

fn parse_family(raw: Option<&str>) -> Result<Option<Family>, CliError> {
    raw.map(|f| {
        let n: u8 = f.parse().map_err(|_| CliError::Validation {
            field: "family".into(),
            reason: format!("expected 4 or 6, got {f}"),
        })?;
        Family::try_from(n).map_err(|reason| CliError::Validation {
            field: "family".into(),
            reason,
        })
    })
    .transpose()
}

pub async fn handle(args: StatsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let family = parse_family(args.family.as_deref())?;
    let plane = super::open(global, false).await?;
    super::pull_state(&plane, global).await?;

    let report = plane.pull_statistics().await?;
    for (daemon_id, err) in &report.errors {
        tracing::warn!(daemon_id = %daemon_id, error = %err, "statistics pull failed");
    }
    tracing::info!(
        daemons = report.daemons,
        subnets = report.subnets,
        "statistics pulled"
    );

    let store = plane.store();
    let subnets = store.get_all_subnets(family).await?;
    let networks = if args.networks {
        Some(store.get_all_shared_networks(family).await?)
    } else {
        None
    };
    let global_stats = store.get_global_stats().await?;

    let color = output::should_color(global.color);
    let out = match global.output {
        OutputFormat::Table => {
            let mut text = output::render_list(
                global.output,
                &subnets,
                |s| SubnetRow {
                    id: s.id.get(),
                    prefix: s.prefix.clone(),
                    shared_network: output::or_dash(s.shared_network_name.as_deref()),
                    servers: s.local_subnets.len(),
                    addr: output::percent(s.addr_utilization, color),
                    pd: if s.family == Family::V6 {
                        output::percent(s.pd_utilization, color)
                    } else {
                        "-".into()
                    },
                },
                |s| s.prefix.clone(),
            )?;
            if let Some(networks) = &networks {
                text.push('\n');
                text.push_str(&output::render_list(
                    global.output,
                    networks,
                    |n| NetworkRow {
                        id: n.id.get(),
                        name: n.name.clone(),
                        family: n.family.to_string(),
                        subnets: n.subnets.len(),
                        addr: output::percent(n.addr_utilization, color),
                        pd: if n.family == Family::V6 {
                            output::percent(n.pd_utilization, color)
                        } else {
                            "-".into()
                        },
                    },
                    |n| n.name.clone(),
                )?);
            }
            text
        }
        OutputFormat::Plain => subnets
            .iter()
            .map(|s| format!("{}\t{:.4}", s.prefix, s.addr_utilization))
            .collect::<Vec<_>>()
            .join("\n"),
        format => output::render_value(
            format,
            &StatsReport {
                subnets: &subnets,
                shared_networks: networks.as_deref(),
                global: &global_stats,
            },
        )?,
    };
    output::print_output(&out, global.quiet);
    plane.shutdown().await;
    Ok(())
}
