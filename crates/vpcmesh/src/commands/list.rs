use super::describe_endpoint;
use colored::Colorize;
use vpcmesh_core::{Connection, MeshService};

pub async fn handle(service: &MeshService) -> anyhow::Result<()> {
    let scan = service.list().await?;

    for failure in &scan.failures {
        eprintln!(
            "{} {}: {}",
            "⚠ Could not query".yellow(),
            failure.region,
            failure.error
        );
    }

    if scan.connections.is_empty() {
        println!("{}", "No connections".dimmed());
        return Ok(());
    }
    for connection in scan.connections.values() {
        println!("{}", format_connection(connection));
    }
    Ok(())
}

/// `<id> : <endpoint> <==> <endpoint> ... , <created>`
pub fn format_connection(connection: &Connection) -> String {
    let members: Vec<String> = connection.endpoints().map(describe_endpoint).collect();
    format!(
        "{} : {} , {}",
        connection.id,
        members.join(" <==> "),
        connection.created_on.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    )
}
