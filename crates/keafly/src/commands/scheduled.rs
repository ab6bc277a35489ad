//! `scheduled`: list scheduled configuration changes.

use tabled::Tabled;

use keafly_core::ScheduledConfigChange;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Deadline")]
    deadline: String,
    #[tabled(rename = "User")]
    user: i64,
    #[tabled(rename = "Operations")]
    operations: String,
    #[tabled(rename = "Status")]
    status: String,
}

fn change_row(c: &ScheduledConfigChange) -> ChangeRow {
    let status = match (&c.error, c.executed) {
        (Some(err), _) => format!("failed: {err}"),
        (None, true) => "executed".into(),
        (None, false) => "pending".into(),
    };
    ChangeRow {
        id: c.id.get(),
        deadline: c.deadline_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        user: c.user_id.get(),
        operations: c
            .updates
            .iter()
            .map(|u| u.operation.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        status,
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let plane = super::open(global, false).await?;
    let changes = plane.store().get_scheduled_config_changes().await?;
    let out = output::render_list(global.output, &changes, change_row, |c| c.id.to_string())?;
    output::print_output(&out, global.quiet);
    plane.shutdown().await;
    Ok(())
}
