use indexmap::{IndexMap, IndexSet};

use rackwise::core::app::{App, AppRule};
use rackwise::core::common::{GroupFactory, GroupType, Level, ServerInfo};
use rackwise::core::inventory::{Host, HostType, Resource, ResourceGroup};
use rackwise::core::node::{Group, Server};
use rackwise::core::numa::{CellId, Numa};
use rackwise::core::optimizer::{NoLease, Optimizer, TurnLease};
use rackwise::core::snapshot::PlacementState;

fn host(name: &str, rack: Option<&str>, cpus: i64, mem: i64, disk: i64) -> Host {
    let mut numa = Numa::new();
    numa.init_cpus(cpus);
    numa.init_mem(mem);
    Host {
        name: name.to_string(),
        rack: rack.map(|r| r.to_string()),
        available: true,
        avail_vcpus: cpus,
        avail_mem: mem,
        avail_local_disk: disk,
        numa,
        memberships: IndexSet::new(),
        server_list: Vec::new(),
        candidate_host_types: IndexMap::new(),
    }
}

fn host_type(id: &str, is_default: bool, cpus: i64, mem: i64, disk: i64) -> HostType {
    let mut numa = Numa::new();
    numa.init_cpus(cpus);
    numa.init_mem(mem);
    HostType {
        id: id.to_string(),
        is_default,
        avail_vcpus: cpus,
        avail_mem: mem,
        avail_local_disk: disk,
        numa,
    }
}

fn aggregate_group(name: &str) -> ResourceGroup {
    ResourceGroup {
        name: name.to_string(),
        group_type: GroupType::Aggregate,
        factory: GroupFactory::Cloud,
        level: Some(Level::Host),
        status: "enabled".to_string(),
        metadata: IndexMap::new(),
        server_list: Vec::new(),
        member_hosts: IndexMap::new(),
    }
}

fn exclusivity_group(name: &str) -> ResourceGroup {
    ResourceGroup {
        name: name.to_string(),
        group_type: GroupType::Exclusivity,
        factory: GroupFactory::Engine,
        level: Some(Level::Host),
        status: "enabled".to_string(),
        metadata: IndexMap::new(),
        server_list: Vec::new(),
        member_hosts: IndexMap::new(),
    }
}

fn server(vid: &str, cpus: i64, mem: i64, disk: i64) -> Server {
    Server::new(vid, vid, "m1", cpus, mem, disk)
}

struct ExpiredLease;

impl TurnLease for ExpiredLease {
    fn is_expired(&self) -> bool {
        true
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
// Servers pack onto the most loaded host that still fits, concentrating
// the remaining free capacity.
fn test_packing_order() {
    init_logger();

    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));
    resource.add_host(host("h2", Some("r1"), 8, 16, 100));
    resource.add_host(host("h3", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    for vid in ["s1", "s2", "s3", "s4"] {
        app.add_server(server(vid, 3, 1, 1));
    }

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements.len(), 4);

    let state = &opt.search.state;
    assert_eq!(state.hosts["h1"].host_avail_vcpus, 2);
    assert_eq!(state.hosts["h2"].host_avail_vcpus, 2);
    assert_eq!(state.hosts["h3"].host_avail_vcpus, 8);
    // The shared rack view reflects every deduction.
    assert_eq!(state.hosts["h3"].rack_avail_vcpus, 12);
    assert_eq!(state.num_of_hosts, 2);
}

#[test]
// All members of a host-level affinity group land on one host.
fn test_affinity_group_on_one_host() {
    init_logger();

    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));
    resource.add_host(host("h2", Some("r1"), 8, 16, 100));
    resource.add_host(host("h3", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    let gid = app.add_group(Group::new("ga", Level::Host));
    for vid in ["s1", "s2", "s3"] {
        let sid = app.add_server(server(vid, 2, 4, 10));
        app.add_to_group(gid, sid);
    }

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements.len(), 3);

    let hosts: IndexSet<String> = placements.iter().map(|p| p.host.clone()).collect();
    assert_eq!(hosts.len(), 1);

    let gr = &opt.search.state.groups["ga"];
    assert_eq!(gr.group_type, GroupType::Affinity);
    assert_eq!(gr.num_of_placed_servers, 1);
}

#[test]
// Host-level diversity spreads members over distinct hosts.
fn test_diversity_spread() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));
    resource.add_host(host("h2", Some("r1"), 8, 16, 100));
    resource.add_host(host("h3", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("dr", GroupType::Diversity, Level::Host));
    for vid in ["s1", "s2", "s3"] {
        let sid = app.add_server(server(vid, 2, 4, 10));
        app.assign_rule("dr", sid);
    }

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();

    let hosts: IndexSet<String> = placements.iter().map(|p| p.host.clone()).collect();
    assert_eq!(hosts.len(), 3);
}

#[test]
// Rack-level diversity spreads members over distinct racks.
fn test_rack_diversity() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));
    resource.add_host(host("h2", Some("r1"), 8, 16, 100));
    resource.add_host(host("h3", Some("r2"), 8, 16, 100));
    resource.add_host(host("h4", Some("r2"), 8, 16, 100));

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("dr", GroupType::Diversity, Level::Rack));
    for vid in ["s1", "s2"] {
        let sid = app.add_server(server(vid, 2, 4, 10));
        app.assign_rule("dr", sid);
    }

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();

    let racks: IndexSet<String> = placements
        .iter()
        .map(|p| p.host_group.clone().unwrap())
        .collect();
    assert_eq!(racks.len(), 2);
}

#[test]
// An exclusive server avoids hosts already serving foreign servers and
// reserves the chosen host for its exclusivity id.
fn test_exclusivity_placement() {
    let mut resource = Resource::new();
    let mut occupied = host("h1", Some("r1"), 8, 16, 100);
    occupied.server_list.push(ServerInfo {
        uuid: Some("u-other".to_string()),
        stack_id: None,
        stack_name: None,
        name: "other".to_string(),
        vcpus: 1,
        mem: 1,
    });
    resource.add_host(occupied);
    resource.add_host(host("h2", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("exr", GroupType::Exclusivity, Level::Host));
    let sid = app.add_server(server("s1", 2, 4, 10));
    app.assign_rule("exr", sid);

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements[0].host, "h2");

    let state = &opt.search.state;
    assert_eq!(state.groups["exr"].num_of_placed_servers, 1);
    assert!(state.hosts["h2"].host_memberships.contains_key("exr"));
}

#[test]
// A request carrying its own exclusivity id cannot use hosts reserved for
// a foreign one, and the failed turn leaves the snapshot untouched.
fn test_exclusivity_conflict() {
    let mut resource = Resource::new();
    resource
        .groups
        .insert("other-exr".to_string(), exclusivity_group("other-exr"));
    for hk in ["h1", "h2"] {
        let mut h = host(hk, Some("r1"), 8, 16, 100);
        h.memberships.insert("other-exr".to_string());
        h.server_list.push(ServerInfo {
            uuid: Some(format!("u-{}", hk)),
            stack_id: None,
            stack_name: None,
            name: format!("v-{}", hk),
            vcpus: 1,
            mem: 1,
        });
        resource.add_host(h);
    }

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("exr", GroupType::Exclusivity, Level::Host));
    for vid in ["s1", "s2"] {
        let sid = app.add_server(server(vid, 2, 4, 10));
        app.assign_rule("exr", sid);
    }

    let mut opt = Optimizer::new();
    assert!(opt.place(&mut app, &resource, &NoLease).is_none());
    assert!(app.status.contains("exclusivity constraint"));

    // Nothing deducted, no membership leaked, no group counters moved.
    let fresh = PlacementState::from_inventory(&resource);
    let state = &opt.search.state;
    assert_eq!(state.groups.len(), fresh.groups.len());
    assert_eq!(
        state.groups["other-exr"].num_of_placed_servers,
        fresh.groups["other-exr"].num_of_placed_servers
    );
    for (hk, hr) in &state.hosts {
        let fr = &fresh.hosts[hk];
        assert_eq!(hr.host_avail_vcpus, fr.host_avail_vcpus);
        assert_eq!(hr.host_avail_mem, fr.host_avail_mem);
        assert_eq!(hr.host_avail_local_disk, fr.host_avail_local_disk);
        assert_eq!(hr.rack_avail_vcpus, fr.rack_avail_vcpus);
        assert_eq!(hr.host_num_of_placed_servers, fr.host_num_of_placed_servers);
        assert_eq!(hr.host_memberships, fr.host_memberships);
    }
    assert!(opt.search.node_placements.is_empty());
}

#[test]
// An affinity pair and an unconstrained server in one request: the pair
// co-locates on a single host, every server places, and the datacenter
// totals drop by exactly the requested demand.
fn test_affinity_pair_with_free_server() {
    let mut resource = Resource::new();
    for hk in ["h1", "h2", "h3"] {
        resource.add_host(host(hk, Some("r1"), 8, 16, 100));
    }

    let mut app = App::new("a1");
    let gid = app.add_group(Group::new("ga", Level::Host));
    for vid in ["s1", "s2"] {
        let sid = app.add_server(server(vid, 4, 8, 20));
        app.add_to_group(gid, sid);
    }
    app.add_server(server("s3", 4, 8, 20));

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements.len(), 3);

    let host_of = |vid: &str| {
        placements
            .iter()
            .find(|p| p.vid == vid)
            .map(|p| p.host.clone())
            .unwrap()
    };
    assert_eq!(host_of("s1"), host_of("s2"));
    assert_ne!(host_of("s3"), host_of("s1"));

    let state = &opt.search.state;
    let cpu: i64 = state.hosts.values().map(|h| h.host_avail_vcpus).sum();
    let mem: i64 = state.hosts.values().map(|h| h.host_avail_mem).sum();
    let disk: i64 = state.hosts.values().map(|h| h.host_avail_local_disk).sum();
    assert_eq!(cpu, 24 - 12);
    assert_eq!(mem, 48 - 24);
    assert_eq!(disk, 300 - 60);
}

#[test]
// Five quorum-diverse servers over three hosts never exceed two per host.
fn test_quorum_diversity_bound() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));
    resource.add_host(host("h2", Some("r1"), 8, 16, 100));
    resource.add_host(host("h3", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("qr", GroupType::QuorumDiversity, Level::Host));
    for vid in ["s1", "s2", "s3", "s4", "s5"] {
        let sid = app.add_server(server(vid, 1, 1, 1));
        app.assign_rule("qr", sid);
    }

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements.len(), 5);

    let gr = &opt.search.state.groups["qr"];
    assert_eq!(gr.num_of_placed_servers, 5);
    for count in gr.num_of_placed_servers_of_host.values() {
        assert!(*count <= 2);
    }
}

#[test]
// A demand no host can satisfy fails with a capacity violation.
fn test_insufficient_capacity() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    app.add_server(server("s1", 10, 4, 10));

    let mut opt = Optimizer::new();
    assert!(opt.place(&mut app, &resource, &NoLease).is_none());
    assert!(app.status.contains("cpu constraint"));
}

#[test]
// An expired lease aborts the turn before searching.
fn test_timeout() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    app.add_server(server("s1", 2, 4, 10));

    let mut opt = Optimizer::new();
    assert!(opt.place(&mut app, &resource, &ExpiredLease).is_none());
    assert_eq!(app.status, "timeout");
}

#[test]
// A rackless host is searchable through the "any" placeholder and yields
// no host group in the result.
fn test_rackless_host() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", None, 8, 16, 100));

    let mut app = App::new("a1");
    app.add_server(server("s1", 2, 4, 10));

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements[0].host, "h1");
    assert_eq!(placements[0].host_group, None);
}

#[test]
// A NUMA-aligned server is pinned to one cell and the cell is reported.
fn test_numa_alignment_result() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", Some("r1"), 8, 16, 100));

    let mut app = App::new("a1");
    let mut s = server("s1", 2, 4, 10);
    let mut specs = IndexMap::new();
    specs.insert("hw:numa_nodes".to_string(), "1".to_string());
    s.extra_specs_list.push(specs);
    app.add_server(s);

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements[0].numa, Some(CellId::Cell0));
}

#[test]
// An undetermined host is lazily resolved to the default profile of the
// server's flavor family.
fn test_dynamic_aggregate_resolution() {
    let mut resource = Resource::new();
    let mut gv = aggregate_group("gv");
    gv.metadata.insert("gv".to_string(), "true".to_string());
    resource.groups.insert("gv".to_string(), gv);

    let mut h1 = host("h1", Some("r1"), 1000, 1000, 1000);
    h1.candidate_host_types
        .insert("gv".to_string(), vec![host_type("gv.large", true, 16, 64, 500)]);
    h1.candidate_host_types
        .insert("mockup".to_string(), vec![host_type("mockup", true, 1000, 1000, 1000)]);
    resource.add_host(h1);

    let mut app = App::new("a1");
    let mut s = server("s1", 4, 8, 20);
    let mut specs = IndexMap::new();
    specs.insert("aggregate_instance_extra_specs:gv".to_string(), "true".to_string());
    s.extra_specs_list.push(specs);
    app.add_server(s);

    let mut opt = Optimizer::new();
    let placements = opt.place(&mut app, &resource, &NoLease).unwrap();
    assert_eq!(placements[0].host, "h1");

    let hr = &opt.search.state.hosts["h1"];
    assert!(hr.candidate_host_types.is_empty());
    assert!(hr.host_memberships.contains_key("gv"));
    assert_eq!(hr.host_avail_vcpus, 12);
    assert_eq!(hr.host_avail_mem, 56);
    assert_eq!(hr.rack_avail_vcpus, 12);
}

#[test]
// A speculative resolution failing the capacity re-check is fully undone.
fn test_dynamic_aggregate_rollback() {
    let mut resource = Resource::new();
    let mut gv = aggregate_group("gv");
    gv.metadata.insert("gv".to_string(), "true".to_string());
    resource.groups.insert("gv".to_string(), gv);

    let mut h1 = host("h1", Some("r1"), 1000, 1000, 1000);
    h1.candidate_host_types
        .insert("gv".to_string(), vec![host_type("gv.small", true, 2, 4, 20)]);
    h1.candidate_host_types
        .insert("mockup".to_string(), vec![host_type("mockup", true, 1000, 1000, 1000)]);
    resource.add_host(h1);

    let mut app = App::new("a1");
    let mut s = server("s1", 4, 8, 20);
    let mut specs = IndexMap::new();
    specs.insert("aggregate_instance_extra_specs:gv".to_string(), "true".to_string());
    s.extra_specs_list.push(specs);
    app.add_server(s);

    let mut opt = Optimizer::new();
    assert!(opt.place(&mut app, &resource, &NoLease).is_none());
    assert_eq!(
        app.status,
        "violate host dynamic-aggregate constraint for node = s1 detail: cpu violation"
    );

    let hr = &opt.search.state.hosts["h1"];
    assert_eq!(hr.host_avail_vcpus, 1000);
    assert_eq!(hr.rack_avail_vcpus, 1000);
    assert!(hr.candidate_host_types.contains_key("gv"));
    assert!(hr.candidate_host_types.contains_key("mockup"));
    assert!(!hr.host_memberships.contains_key("gv"));
}

#[test]
// A YAML inventory parses with field defaults applied and rack and
// datacenter aggregates recomputed from the listed hosts.
fn test_inventory_from_yaml() {
    let yaml = r#"
hosts:
  h1:
    name: h1
    rack: r1
    avail_vcpus: 8
    avail_mem: 16
    avail_local_disk: 100
    memberships: ["az:nova"]
  h2:
    name: h2
    rack: r1
    avail_vcpus: 8
    avail_mem: 16
    avail_local_disk: 100
groups:
  "az:nova":
    name: "az:nova"
    group_type: az
    level: host
"#;
    let resource = Resource::from_yaml(yaml).unwrap();

    assert_eq!(resource.cpu_avail, 16);
    assert_eq!(resource.mem_avail, 32);
    assert_eq!(resource.local_disk_avail, 200);

    let h1 = &resource.hosts["h1"];
    assert!(h1.available);
    assert!(h1.server_list.is_empty());
    assert!(h1.candidate_host_types.is_empty());

    let rack = &resource.host_groups["r1"];
    assert_eq!(rack.avail_vcpus, 16);
    assert_eq!(rack.avail_mem, 32);
    assert!(rack.memberships.contains("az:nova"));

    let az = &resource.groups["az:nova"];
    assert_eq!(az.group_type, GroupType::Az);
    assert_eq!(az.status, "enabled");
    assert_eq!(az.factory, GroupFactory::Cloud);
}
