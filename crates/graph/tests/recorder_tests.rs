//! Integration tests for the component recorder and dependency graph.
//!
//! Covers the merge-rule contract: idempotence, commutativity,
//! dev-dependency monotonicity, cycle safety, and the cross-location
//! global merge.

use std::sync::Arc;

use compscan_core::types::{Component, ComponentType};
use compscan_graph::{ComponentRecorder, Usage};

fn component(name: &str, version: &str) -> Component {
    Component::new(ComponentType::Npm, name, version)
}

#[test]
fn register_usage_twice_with_identical_args_equals_once() {
    let recorder = ComponentRecorder::new("npm", true);
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");

    let usage = Usage::new(component("lodash", "4.17.21")).explicit(true).development(false);
    file.register_usage(usage.clone());
    file.register_usage(usage);

    let detected = recorder.detected_components();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].file_paths.len(), 1);

    let id = component("lodash", "4.17.21").id();
    file.with_graph(|g| {
        assert!(g.is_explicitly_referenced(&id));
        assert_eq!(g.is_development_dependency(&id), Some(false));
    });
}

#[test]
fn independent_registrations_commute() {
    // A-then-B and B-then-A must yield identical graph state
    let build = |first: &str, second: &str| {
        let recorder = ComponentRecorder::new("npm", true);
        let file = recorder.create_single_file_recorder("/repo/package-lock.json");
        for name in [first, second] {
            let usage = match name {
                "a" => Usage::new(component("a", "1.0")).explicit(true).development(false),
                _ => Usage::new(component("b", "1.0")).development(true),
            };
            file.register_usage(usage);
        }
        let a_id = component("a", "1.0").id();
        let b_id = component("b", "1.0").id();
        file.with_graph(|g| {
            (
                g.is_explicitly_referenced(&a_id),
                g.is_development_dependency(&a_id),
                g.is_explicitly_referenced(&b_id),
                g.is_development_dependency(&b_id),
            )
        })
    };

    assert_eq!(build("a", "b"), build("b", "a"));
}

#[test]
fn dev_dependency_is_monotonically_false() {
    let recorder = ComponentRecorder::new("npm", true);
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");
    let id = component("left-pad", "1.3.0").id();

    // true, false, true, unknown — any false observation pins the value
    file.register_usage(Usage::new(component("left-pad", "1.3.0")).development(true));
    file.register_usage(Usage::new(component("left-pad", "1.3.0")).development(false));
    file.register_usage(Usage::new(component("left-pad", "1.3.0")).development(true));
    file.register_usage(Usage::new(component("left-pad", "1.3.0")));

    file.with_graph(|g| assert_eq!(g.is_development_dependency(&id), Some(false)));
}

#[test]
fn ancestors_terminate_on_self_referential_requires_graph() {
    let recorder = ComponentRecorder::new("npm", true);
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");

    let a = component("a", "1.0");
    let b = component("b", "1.0");
    let c = component("c", "1.0");
    file.register_usage(Usage::new(a.clone()));
    file.register_usage(Usage::new(b.clone()).parent(a.id()));
    file.register_usage(Usage::new(c.clone()).parent(b.id()));
    // close the cycle: a depends on c
    file.register_usage(Usage::new(a.clone()).parent(c.id()));

    file.with_graph(|g| {
        let ancestors = g.get_ancestors(&a.id());
        assert_eq!(ancestors.len(), 2);
        assert!(!ancestors.contains(&a.id()));
    });
}

#[test]
fn same_component_in_two_locations_merges_into_one_entry() {
    let recorder = ComponentRecorder::new("npm", true);
    let first = recorder.create_single_file_recorder("/repo/a/package-lock.json");
    let second = recorder.create_single_file_recorder("/repo/b/package-lock.json");

    first.register_usage(Usage::new(component("lodash", "4.17.21")).container("layer-1"));
    second.register_usage(Usage::new(component("lodash", "4.17.21")).container("layer-2"));

    let detected = recorder.detected_components();
    assert_eq!(detected.len(), 1);

    let entry = &detected[0];
    assert_eq!(entry.file_paths.len(), 2, "file paths must union across locations");
    assert_eq!(entry.container_ids.len(), 2, "container ids must union across locations");
}

#[test]
fn create_single_file_recorder_is_idempotent_per_location() {
    let recorder = ComponentRecorder::new("npm", true);
    let first = recorder.create_single_file_recorder("/repo/package-lock.json");
    let second = recorder.create_single_file_recorder("/repo/package-lock.json");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(recorder.single_file_recorders().len(), 1);
}

#[test]
fn additional_related_files_attach_to_every_component_at_read_time() {
    let recorder = ComponentRecorder::new("npm", true);
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");

    file.register_usage(Usage::new(component("a", "1.0")));
    file.register_usage(Usage::new(component("b", "2.0")));
    file.add_additional_related_file("/repo/package.json");

    for detected in recorder.detected_components() {
        assert!(
            detected
                .file_paths
                .contains(std::path::Path::new("/repo/package.json")),
            "{} should carry the related file",
            detected.component
        );
    }
}

#[test]
fn parse_failures_are_kept_out_of_the_graph() {
    let recorder = ComponentRecorder::new("npm", true);
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");

    file.register_usage(Usage::new(component("ok", "1.0")));
    file.register_package_parse_failure("broken-entry");
    file.register_package_parse_failure("broken-entry");

    assert_eq!(recorder.detected_components().len(), 1);
    assert_eq!(recorder.skipped_components(), vec!["broken-entry".to_owned()]);
}

#[test]
fn concurrent_registration_to_one_location_is_safe() {
    let recorder = Arc::new(ComponentRecorder::new("npm", true));
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");
    let root = component("root", "1.0");
    file.register_usage(Usage::new(root.clone()).explicit(true));

    let mut handles = Vec::new();
    for worker in 0..8 {
        let file = file.clone();
        let root_id = root.id();
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                let child = component(&format!("dep-{}", i % 10), "1.0");
                file.register_usage(
                    Usage::new(child)
                        .parent(root_id.clone())
                        .development(worker % 2 == 0),
                );
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker should not panic");
    }

    // 10 distinct children + root, each child dev-pinned to false by AND
    let detected = recorder.detected_components();
    assert_eq!(detected.len(), 11);
    file.with_graph(|g| {
        let dep_id = component("dep-0", "1.0").id();
        assert_eq!(g.is_development_dependency(&dep_id), Some(false));
        assert_eq!(g.get_ancestors(&dep_id), vec![root.id()]);
    });
}

/// End-to-end scenario from the recorder contract:
/// R (explicit) → A (parent=R) → B (parent=A), then A re-registered with
/// no parent, explicit=false, dev=true.
#[test]
fn end_to_end_register_scenario() {
    let recorder = ComponentRecorder::new("npm", true);
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");

    let r = component("r", "1.0");
    let a = component("a", "1.0");
    let b = component("b", "1.0");

    file.register_usage(Usage::new(r.clone()).explicit(true));
    file.register_usage(Usage::new(a.clone()).parent(r.id()));
    file.register_usage(Usage::new(b.clone()).parent(a.id()));
    file.register_usage(Usage::new(a.clone()).explicit(false).development(true));

    file.with_graph(|g| {
        assert!(g.is_explicitly_referenced(&r.id()));
        // both observations of A were explicit=false: OR stays false
        assert!(!g.is_explicitly_referenced(&a.id()));
        // only known observation is dev=true: AND over known values is true
        assert_eq!(g.is_development_dependency(&a.id()), Some(true));
        // edges survive the re-registration
        assert_eq!(g.get_ancestors(&b.id()), vec![a.id(), r.id()]);
        assert_eq!(g.get_explicit_referenced_dependency_ids(&b.id()), vec![r.id()]);
    });

    let scanned = recorder.scanned_components();
    let b_entry = scanned
        .iter()
        .find(|c| c.component == b)
        .expect("b should be reported");
    assert_eq!(b_entry.top_level_referrers, vec![r.clone()]);
}

#[test]
fn recorder_survives_a_panicked_graph_access() {
    let recorder = ComponentRecorder::new("npm", true);
    let file = recorder.create_single_file_recorder("/repo/package-lock.json");
    file.register_usage(Usage::new(component("lodash", "4.17.21")).explicit(true));

    // a worker dying while holding the graph lock must not wedge the scan
    let crashed = std::thread::spawn({
        let file = Arc::clone(&file);
        move || file.with_graph(|_| panic!("worker died mid-query"))
    })
    .join();
    assert!(crashed.is_err());

    file.register_usage(Usage::new(component("left-pad", "1.3.0")));
    assert_eq!(recorder.detected_components().len(), 2);
    file.with_graph(|g| {
        assert!(g.is_explicitly_referenced(&component("lodash", "4.17.21").id()));
        assert!(g.contains(&component("left-pad", "1.3.0").id()));
    });
}
