//! Gateway security group rules

use vpcmesh_cloud::{IngressRule, Protocol};

pub const SECURITY_GROUP_DESCRIPTION: &str = "vpcmesh gateway security group";

/// IKE
pub const IKE_PORT: i32 = 500;
/// IPsec NAT traversal
pub const NAT_T_PORT: i32 = 4500;

/// Ingress rules for one gateway
///
/// Everything from the local network, so the gateway can forward its
/// traffic, plus the IPsec control ports from each peer gateway's public
/// address only.
pub fn ingress_rules(local_cidr: &str, peer_ips: &[&str]) -> Vec<IngressRule> {
    let local = vec![local_cidr.to_string()];
    let mut rules = vec![
        IngressRule {
            protocol: Protocol::Tcp,
            from_port: 1,
            to_port: 65535,
            cidrs: local.clone(),
        },
        IngressRule {
            protocol: Protocol::Udp,
            from_port: 1,
            to_port: 65535,
            cidrs: local.clone(),
        },
        IngressRule {
            protocol: Protocol::Icmp,
            from_port: -1,
            to_port: -1,
            cidrs: local,
        },
    ];

    if peer_ips.is_empty() {
        return rules;
    }
    let peers: Vec<String> = peer_ips.iter().map(|ip| format!("{ip}/32")).collect();
    for (protocol, port) in [
        (Protocol::Udp, IKE_PORT),
        (Protocol::Tcp, IKE_PORT),
        (Protocol::Udp, NAT_T_PORT),
    ] {
        rules.push(IngressRule {
            protocol,
            from_port: port,
            to_port: port,
            cidrs: peers.clone(),
        });
    }
    rules
}
