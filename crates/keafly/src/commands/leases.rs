//! `leases search` / `leases declined`.

use chrono::DateTime;
use serde::Serialize;
use tabled::Tabled;

use keafly_core::Lease;

use crate::cli::{GlobalOpts, LeasesArgs, LeasesCommand};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct LeaseRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Daemon")]
    daemon_id: i64,
    #[tabled(rename = "Subnet")]
    subnet_id: i64,
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "State")]
    state: i64,
    #[tabled(rename = "Expires")]
    expires: String,
}

impl From<&Lease> for LeaseRow {
    fn from(l: &Lease) -> Self {
        let address = match l.prefix_len {
            Some(len) => format!("{}/{len}", l.ip_address),
            None => l.ip_address.clone(),
        };
        let identifier = l
            .hw_address
            .as_deref()
            .or(l.duid.as_deref())
            .or(l.client_id.as_deref());
        Self {
            address,
            kind: l.lease_type.map_or_else(|| "-".into(), |t| t.to_string()),
            daemon_id: l.daemon_id.get(),
            subnet_id: l.subnet_id,
            identifier: output::or_dash(identifier),
            hostname: output::or_dash(l.hostname.as_deref().filter(|h| !h.is_empty())),
            state: l.state,
            expires: DateTime::from_timestamp(l.expires_at(), 0)
                .map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

pub async fn handle(args: LeasesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let LeasesCommand::Search { text } = &args.command {
        if text.trim().is_empty() {
            return Err(CliError::Validation {
                field: "text".into(),
                reason: "search text must not be empty".into(),
            });
        }
    }

    let plane = super::open(global, false).await?;
    super::pull_state(&plane, global).await?;

    let result = match &args.command {
        LeasesCommand::Search { text } => plane.leases().find_leases(text).await,
        LeasesCommand::Declined => plane.leases().find_declined_leases().await,
    };

    let out = output::render_list(global.output, &result.leases, |l| LeaseRow::from(l), |l| {
        l.ip_address.clone()
    })?;
    output::print_output(&out, global.quiet);
    output::print_erred(&result.erred_daemons, global.quiet);
    plane.shutdown().await;
    Ok(())
}
