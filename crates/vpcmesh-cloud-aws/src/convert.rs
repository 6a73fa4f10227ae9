//! SDK type conversions into the provider-neutral model

use aws_sdk_ec2::types as ec2;
use vpcmesh_cloud::{
    Address, Instance, InstanceState, Network, NetworkInterface, Route, RouteState, RouteTable,
    RouteTableAssociation, SecurityGroup, Subnet, Tag,
};

pub(crate) fn network(vpc: &ec2::Vpc, region: &str) -> Option<Network> {
    Some(Network {
        id: vpc.vpc_id()?.to_string(),
        cidr_block: vpc.cidr_block()?.to_string(),
        region: region.to_string(),
    })
}

pub(crate) fn subnet(subnet: &ec2::Subnet) -> Option<Subnet> {
    Some(Subnet {
        id: subnet.subnet_id()?.to_string(),
        network_id: subnet.vpc_id()?.to_string(),
        cidr_block: subnet.cidr_block()?.to_string(),
        available_addresses: subnet
            .available_ip_address_count()
            .map(|n| n.max(0) as u32)
            .unwrap_or(0),
    })
}

pub(crate) fn route(route: &ec2::Route) -> Route {
    Route {
        destination_cidr: route.destination_cidr_block().map(str::to_string),
        gateway_id: route.gateway_id().map(str::to_string),
        instance_id: route.instance_id().map(str::to_string),
        state: route
            .state()
            .map(|s| RouteState::from_name(s.as_str()))
            .unwrap_or(RouteState::Unknown),
    }
}

pub(crate) fn route_table(table: &ec2::RouteTable) -> Option<RouteTable> {
    Some(RouteTable {
        id: table.route_table_id()?.to_string(),
        network_id: table.vpc_id()?.to_string(),
        routes: table.routes().iter().map(route).collect(),
        associations: table
            .associations()
            .iter()
            .map(|a| RouteTableAssociation {
                subnet_id: a.subnet_id().map(str::to_string),
                main: a.main().unwrap_or(false),
            })
            .collect(),
    })
}

pub(crate) fn security_group(group: &ec2::SecurityGroup) -> Option<SecurityGroup> {
    Some(SecurityGroup {
        id: group.group_id()?.to_string(),
        name: group.group_name().unwrap_or_default().to_string(),
        network_id: group.vpc_id().map(str::to_string),
    })
}

pub(crate) fn address(address: &ec2::Address) -> Option<Address> {
    Some(Address {
        public_ip: address.public_ip()?.to_string(),
        allocation_id: address.allocation_id().map(str::to_string),
        instance_id: address.instance_id().map(str::to_string),
    })
}

pub(crate) fn network_interface(nic: &ec2::NetworkInterface) -> Option<NetworkInterface> {
    Some(NetworkInterface {
        id: nic.network_interface_id()?.to_string(),
        instance_id: nic
            .attachment()
            .and_then(|a| a.instance_id())
            .map(str::to_string),
    })
}

pub(crate) fn instance(instance: &ec2::Instance) -> Option<Instance> {
    Some(Instance {
        id: instance.instance_id()?.to_string(),
        state: instance
            .state()
            .and_then(|s| s.name())
            .map(|name| InstanceState::from_name(name.as_str()))
            .unwrap_or(InstanceState::Unknown),
        network_id: instance.vpc_id().map(str::to_string),
        subnet_id: instance.subnet_id().map(str::to_string),
        tags: instance
            .tags()
            .iter()
            .filter_map(|t| Some(Tag::new(t.key()?, t.value().unwrap_or_default())))
            .collect(),
    })
}

pub(crate) fn sdk_tag(tag: &Tag) -> ec2::Tag {
    ec2::Tag::builder().key(&tag.key).value(&tag.value).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_conversion() {
        let sdk = ec2::Route::builder()
            .destination_cidr_block("0.0.0.0/0")
            .gateway_id("igw-0abc")
            .state(ec2::RouteState::Active)
            .build();

        let route = route(&sdk);
        assert!(route.is_internet_default());
        assert_eq!(route.instance_id, None);
    }

    #[test]
    fn test_route_table_main_association() {
        let sdk = ec2::RouteTable::builder()
            .route_table_id("rtb-1")
            .vpc_id("vpc-1")
            .associations(ec2::RouteTableAssociation::builder().main(true).build())
            .associations(
                ec2::RouteTableAssociation::builder()
                    .main(false)
                    .subnet_id("subnet-1")
                    .build(),
            )
            .build();

        let table = route_table(&sdk).unwrap();
        assert!(table.is_main());
        assert_eq!(table.subnet_ids().collect::<Vec<_>>(), vec!["subnet-1"]);
    }

    #[test]
    fn test_instance_conversion_reads_state_and_tags() {
        let sdk = ec2::Instance::builder()
            .instance_id("i-0123")
            .vpc_id("vpc-1")
            .subnet_id("subnet-1")
            .state(
                ec2::InstanceState::builder()
                    .name(ec2::InstanceStateName::Running)
                    .build(),
            )
            .tags(ec2::Tag::builder().key("Name").value("vpcmesh").build())
            .build();

        let instance = instance(&sdk).unwrap();
        assert_eq!(instance.state, InstanceState::Running);
        assert_eq!(instance.tag("Name"), Some("vpcmesh"));
    }

    #[test]
    fn test_missing_ids_are_skipped() {
        assert!(subnet(&ec2::Subnet::builder().vpc_id("vpc-1").build()).is_none());
        assert!(address(&ec2::Address::builder().allocation_id("eipalloc-1").build()).is_none());
    }
}
