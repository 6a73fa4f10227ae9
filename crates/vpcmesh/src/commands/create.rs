use super::describe_endpoint;
use colored::Colorize;
use vpcmesh_core::MeshService;

pub async fn handle(service: &MeshService, endpoints: &[String]) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("Creating a mesh between {} endpoints...", endpoints.len()).blue()
    );
    println!("Instance type: {}", service.config().instance_type.cyan());

    let connection = match service.create(endpoints).await {
        Ok(connection) => connection,
        Err(err) => {
            if err.is_pre_mutation() {
                println!("{}", "Nothing was created.".dimmed());
            } else {
                println!(
                    "{}",
                    "Provisioning failed; created resources were rolled back.".yellow()
                );
            }
            return Err(err.into());
        }
    };

    println!();
    println!(
        "{} {}",
        "✓ Connection created:".green().bold(),
        connection.id.cyan().bold()
    );
    for endpoint in connection.endpoints() {
        println!(
            "  {} gateway {} at {}",
            describe_endpoint(endpoint),
            endpoint.instance_id().unwrap_or("-").cyan(),
            endpoint.public_ip().unwrap_or("-").cyan()
        );
    }
    Ok(())
}
