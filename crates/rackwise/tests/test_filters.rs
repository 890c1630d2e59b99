use indexmap::{IndexMap, IndexSet};

use rackwise::core::app::{App, AppRule};
use rackwise::core::common::{GroupFactory, GroupType, Level, ServerInfo};
use rackwise::core::filter::Filter;
use rackwise::core::filters::aggregate::AggregateInstanceExtraSpecsFilter;
use rackwise::core::filters::az::AvailabilityZoneFilter;
use rackwise::core::filters::diversity::DiversityFilter;
use rackwise::core::filters::exclusivity::ExclusivityFilter;
use rackwise::core::filters::no_exclusivity::NoExclusivityFilter;
use rackwise::core::filters::numa::NumaFilter;
use rackwise::core::filters::quorum_diversity::QuorumDiversityFilter;
use rackwise::core::filters::utils::match_extra_spec;
use rackwise::core::inventory::{Host, Resource, ResourceGroup};
use rackwise::core::node::Server;
use rackwise::core::numa::Numa;
use rackwise::core::snapshot::{GroupResource, PlacementState};

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

fn group(name: &str, group_type: GroupType) -> ResourceGroup {
    ResourceGroup {
        name: name.to_string(),
        group_type,
        factory: GroupFactory::Cloud,
        level: Some(Level::Host),
        status: "enabled".to_string(),
        metadata: IndexMap::new(),
        server_list: Vec::new(),
        member_hosts: IndexMap::new(),
    }
}

fn placed_server(name: &str) -> ServerInfo {
    ServerInfo {
        uuid: Some(format!("uuid-{}", name)),
        stack_id: None,
        stack_name: None,
        name: name.to_string(),
        vcpus: 1,
        mem: 1,
    }
}

fn keys(candidates: &[&str]) -> Vec<String> {
    candidates.iter().map(|c| c.to_string()).collect()
}

#[test]
fn test_match_extra_spec_grammar() {
    // Plain "=" means greater-or-equal.
    assert!(match_extra_spec("6", "= 5"));
    assert!(!match_extra_spec("4", "= 5"));
    assert!(match_extra_spec("2.0", "== 2"));
    assert!(match_extra_spec("4", "!= 3"));
    assert!(match_extra_spec("3", "<= 3"));

    // Non-numeric operands of numeric operations never match.
    assert!(!match_extra_spec("abc", "= 5"));
    assert!(!match_extra_spec("5", "== abc"));

    assert!(match_extra_spec("foo", "s== foo"));
    assert!(!match_extra_spec("foo", "s!= foo"));
    assert!(match_extra_spec("abc", "s< abd"));

    assert!(match_extra_spec("foobar", "<in> bar"));
    assert!(!match_extra_spec("foo", "<in> bar"));
    assert!(match_extra_spec("xaby", "<all-in> a b"));
    assert!(!match_extra_spec("xay", "<all-in> a b"));
    assert!(!match_extra_spec("anything", "<all-in>"));

    assert!(match_extra_spec("v2", "<or> v1 <or> v2"));
    assert!(!match_extra_spec("v3", "<or> v1 <or> v2"));

    // Unknown leading token falls back to whole-string equality.
    assert!(match_extra_spec("hello world", "hello world"));
    assert!(!match_extra_spec("hello", "hello world"));
}

#[test]
// Only hosts belonging to the requested availability zone survive.
fn test_az_filter() {
    let mut resource = Resource::new();
    resource.groups.insert("az:nova".to_string(), group("az:nova", GroupType::Az));
    let mut h1 = host("h1", None, 8, 16, 100);
    h1.memberships.insert("az:nova".to_string());
    resource.add_host(h1);
    resource.add_host(host("h2", None, 8, 16, 100));

    let mut state = PlacementState::from_inventory(&resource);

    let mut app = App::new("a1");
    let mut s = Server::new("s1", "s1", "m1", 2, 4, 10);
    s.availability_zone = Some("nova".to_string());
    let n = app.add_server(s);

    let mut f = AvailabilityZoneFilter::new();
    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, n, &app, &state));

    let survived = f.filter_candidates(Level::Host, n, &app, &mut state, &keys(&["h1", "h2"]));
    assert_eq!(survived, vec!["h1".to_string()]);
}

#[test]
// A server without an availability zone skips the filter entirely.
fn test_az_filter_precondition() {
    let resource = Resource::new();
    let state = PlacementState::from_inventory(&resource);

    let mut app = App::new("a1");
    let n = app.add_server(Server::new("s1", "s1", "m1", 2, 4, 10));

    let mut f = AvailabilityZoneFilter::new();
    f.init_condition();
    assert!(!f.check_pre_condition(Level::Host, n, &app, &state));
}

#[test]
// An exclusive node may land on an empty host or one already reserved for
// the same exclusivity id, never on a host with foreign servers.
fn test_exclusivity_filter() {
    let mut resource = Resource::new();
    let mut occupied = host("h1", None, 8, 16, 100);
    occupied.server_list.push(placed_server("other"));
    resource.add_host(occupied);
    resource.add_host(host("h2", None, 8, 16, 100));
    let mut reserved = host("h3", None, 8, 16, 100);
    reserved.server_list.push(placed_server("mine"));
    resource.add_host(reserved);

    let mut state = PlacementState::from_inventory(&resource);
    state.hosts["h3"]
        .host_memberships
        .insert("exr".to_string(), GroupType::Exclusivity);

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("exr", GroupType::Exclusivity, Level::Host));
    let n = app.add_server(Server::new("s1", "s1", "m1", 2, 4, 10));
    app.assign_rule("exr", n);

    let mut f = ExclusivityFilter::new();
    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, n, &app, &state));

    let survived = f.filter_candidates(Level::Host, n, &app, &mut state, &keys(&["h1", "h2", "h3"]));
    assert_eq!(survived, vec!["h2".to_string(), "h3".to_string()]);
}

#[test]
// More than one exclusivity rule at the same level is unsolvable.
fn test_multiple_exclusivities() {
    let resource = Resource::new();
    let state = PlacementState::from_inventory(&resource);

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("ex1", GroupType::Exclusivity, Level::Host));
    app.add_rule(AppRule::new("ex2", GroupType::Exclusivity, Level::Host));
    let n = app.add_server(Server::new("s1", "s1", "m1", 2, 4, 10));
    app.assign_rule("ex1", n);
    app.assign_rule("ex2", n);

    let mut f = ExclusivityFilter::new();
    f.init_condition();
    assert!(!f.check_pre_condition(Level::Host, n, &app, &state));
    assert_eq!(f.status(), Some("multiple exclusivities for node = s1"));
}

#[test]
// A node without an exclusivity id stays off hosts reserved by one.
fn test_no_exclusivity_filter() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", None, 8, 16, 100));
    resource.add_host(host("h2", None, 8, 16, 100));

    let mut state = PlacementState::from_inventory(&resource);
    state.hosts["h1"]
        .host_memberships
        .insert("exr".to_string(), GroupType::Exclusivity);
    state.groups.insert(
        "exr".to_string(),
        GroupResource::new("exr", GroupType::Exclusivity, GroupFactory::Engine, Level::Host),
    );

    let mut app = App::new("a1");
    let n = app.add_server(Server::new("s1", "s1", "m1", 2, 4, 10));

    let mut f = NoExclusivityFilter::new();
    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, n, &app, &state));

    let survived = f.filter_candidates(Level::Host, n, &app, &mut state, &keys(&["h1", "h2"]));
    assert_eq!(survived, vec!["h2".to_string()]);
}

#[test]
// The numa filter applies only to servers requesting single-cell alignment
// and checks per-cell capacity, not host totals.
fn test_numa_filter() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", None, 8, 16, 100));
    let mut state = PlacementState::from_inventory(&resource);

    let mut app = App::new("a1");
    let plain = app.add_server(Server::new("s1", "s1", "m1", 6, 4, 10));

    let mut aligned_server = Server::new("s2", "s2", "m1", 6, 4, 10);
    let mut specs = IndexMap::new();
    specs.insert("hw:numa_nodes".to_string(), "1".to_string());
    aligned_server.extra_specs_list.push(specs);
    let aligned = app.add_server(aligned_server);

    let mut f = NumaFilter::new();
    f.init_condition();
    assert!(!f.check_pre_condition(Level::Host, plain, &app, &state));

    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, aligned, &app, &state));

    // 6 vcpus exceed either 4-cpu cell, though the host holds 8 in total.
    let survived = f.filter_candidates(Level::Host, aligned, &app, &mut state, &keys(&["h1"]));
    assert!(survived.is_empty());
}

#[test]
// A host already serving another member of the diversity rule is rejected.
fn test_diversity_filter() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", None, 8, 16, 100));
    resource.add_host(host("h2", None, 8, 16, 100));

    let mut state = PlacementState::from_inventory(&resource);
    state.hosts["h1"]
        .host_memberships
        .insert("dr".to_string(), GroupType::Diversity);

    let mut app = App::new("a1");
    app.add_rule(AppRule::new("dr", GroupType::Diversity, Level::Host));
    let n = app.add_server(Server::new("s1", "s1", "m1", 2, 4, 10));
    app.assign_rule("dr", n);

    let mut f = DiversityFilter::new();
    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, n, &app, &state));

    let survived = f.filter_candidates(Level::Host, n, &app, &mut state, &keys(&["h1", "h2"]));
    assert_eq!(survived, vec!["h2".to_string()]);
}

#[test]
// Strictly diverse hosts are preferred; once none remain, hosts below the
// quorum bound are allowed.
fn test_quorum_diversity_filter() {
    let mut resource = Resource::new();
    resource.add_host(host("h1", None, 8, 16, 100));
    resource.add_host(host("h2", None, 8, 16, 100));
    resource.add_host(host("h3", None, 8, 16, 100));

    let mut state = PlacementState::from_inventory(&resource);

    let mut app = App::new("a1");
    let mut rule = AppRule::new("qr", GroupType::QuorumDiversity, Level::Host);
    rule.members = vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()];
    app.add_rule(rule);
    let n = app.add_server(Server::new("s5", "s5", "m1", 2, 4, 10));
    app.assign_rule("qr", n);

    // While a host without members of the rule exists, it is the only choice.
    state.hosts["h1"]
        .host_memberships
        .insert("qr".to_string(), GroupType::QuorumDiversity);
    state.hosts["h2"]
        .host_memberships
        .insert("qr".to_string(), GroupType::QuorumDiversity);

    let mut f = QuorumDiversityFilter::new();
    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, n, &app, &state));
    let survived = f.filter_candidates(Level::Host, n, &app, &mut state, &keys(&["h1", "h2", "h3"]));
    assert_eq!(survived, vec!["h3".to_string()]);

    // All hosts hold members now; 5 servers in total means at most 2 per
    // host, so only hosts below that bound pass.
    state.hosts["h3"]
        .host_memberships
        .insert("qr".to_string(), GroupType::QuorumDiversity);
    let mut gr = GroupResource::new("qr", GroupType::QuorumDiversity, GroupFactory::Engine, Level::Host);
    gr.num_of_placed_servers_of_host.insert("h1".to_string(), 2);
    gr.num_of_placed_servers_of_host.insert("h2".to_string(), 1);
    state.groups.insert("qr".to_string(), gr);

    let mut f = QuorumDiversityFilter::new();
    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, n, &app, &state));
    let survived = f.filter_candidates(Level::Host, n, &app, &mut state, &keys(&["h1", "h2", "h3"]));
    assert_eq!(survived, vec!["h2".to_string(), "h3".to_string()]);
}

#[test]
// Extra specs are matched against the metadata of the host's aggregates;
// hosts outside a satisfying aggregate are rejected.
fn test_aggregate_filter() {
    let mut resource = Resource::new();
    let mut agg = group("agg1", GroupType::Aggregate);
    agg.metadata.insert("cpu_arch".to_string(), "x86, arm".to_string());
    resource.groups.insert("agg1".to_string(), agg);

    let mut h1 = host("h1", None, 8, 16, 100);
    h1.memberships.insert("agg1".to_string());
    resource.add_host(h1);
    resource.add_host(host("h2", None, 8, 16, 100));

    let mut state = PlacementState::from_inventory(&resource);

    let mut app = App::new("a1");
    let mut s = Server::new("s1", "s1", "m1", 2, 4, 10);
    let mut specs = IndexMap::new();
    specs.insert(
        "aggregate_instance_extra_specs:cpu_arch".to_string(),
        "s== x86".to_string(),
    );
    s.extra_specs_list.push(specs);
    let n = app.add_server(s);

    let mut f = AggregateInstanceExtraSpecsFilter::new();
    f.init_condition();
    assert!(f.check_pre_condition(Level::Host, n, &app, &state));

    let survived = f.filter_candidates(Level::Host, n, &app, &mut state, &keys(&["h1", "h2"]));
    assert_eq!(survived, vec!["h1".to_string()]);
}
