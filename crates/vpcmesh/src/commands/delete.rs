use colored::Colorize;
use vpcmesh_core::MeshService;

pub async fn handle(service: &MeshService, id: &str) -> anyhow::Result<()> {
    println!("{}", format!("Deleting connection {id}...").blue());

    let report = service.delete(id).await?;

    for step in &report.succeeded {
        println!("  {} {} {}", "✓".green(), step.compensation, step.resource_id.dimmed());
    }
    for step in &report.failed {
        println!(
            "  {} {} {}: {}",
            "✗".red(),
            step.compensation,
            step.resource_id,
            step.error.as_deref().unwrap_or("unknown error").red()
        );
    }
    for instance_id in &report.pending_termination {
        println!(
            "  {} {} still shutting down",
            "⚠".yellow(),
            instance_id.yellow()
        );
    }

    println!();
    if report.is_clean() {
        println!(
            "{} ({} steps, {} ms)",
            "✓ Connection deleted".green().bold(),
            report.succeeded.len(),
            report.duration_ms
        );
    } else {
        println!(
            "{}",
            format!(
                "⚠ Connection deleted with {} failed step(s); remaining resources need manual cleanup",
                report.failed.len() + report.pending_termination.len()
            )
            .yellow()
            .bold()
        );
    }
    Ok(())
}
