//! End-to-end detector behavior on small methods shaped like compiler output.

use narrowscope::bytecode::{InvokeKind, MethodBody, SymbolicStack};
use narrowscope::narrowing::{analyze_method, RiskPolicy, ScopeNarrowingDetector};
use narrowscope::testkit::MethodBuilder;
use narrowscope::Finding;
use pretty_assertions::assert_eq;

const FLAGS: &str = "com/acme/Flags";

fn findings(method: &MethodBody) -> Vec<Finding> {
    analyze_method(method, &RiskPolicy::default()).unwrap()
}

/// Walks `method` the way `analyze_method` does, checking the tree after
/// every instruction, and hands back the detector before it reports.
fn walk<'p>(method: &MethodBody, policy: &'p RiskPolicy) -> ScopeNarrowingDetector<'p> {
    let mut detector = ScopeNarrowingDetector::new(policy);
    assert!(detector.begin_method(method));
    let mut stack = SymbolicStack::for_method(method);
    for (index, insn) in method.instructions.iter().enumerate() {
        stack.enter(insn.address);
        let origin = detector.observe(insn, method.next_address(index), &stack, method);
        stack.apply(insn);
        if let Some(origin) = origin {
            stack.tag_top(origin);
        }
        let tree = detector.tree().unwrap();
        if let Err(violation) = tree.check_invariants() {
            panic!("after {insn:?}: {violation}\n{}", tree.render());
        }
    }
    detector
}

fn summary(found: &[Finding]) -> Vec<(u32, u16, u32, u32)> {
    found
        .iter()
        .map(|f| (f.address, f.slot, f.scope_start, f.scope_finish))
        .collect()
}

/// int count = 5; if (enabled()) { use(count); }
fn guarded_use(looped: bool) -> MethodBody {
    let builder = MethodBuilder::new("scenario", "()V")
        .label("top")
        .const_int(5)
        .store(0)
        .label("v")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("L2")
        .load(0)
        .other(1, 0)
        .label("L2");
    let builder = if looped {
        builder
            .invoke_static(FLAGS, "again", "()Z")
            .if_false("top")
    } else {
        builder
    };
    builder
        .return_void()
        .local(0, "count", "I", "v", "L2")
        .build()
}

#[test]
fn test_scenario_a_single_conditional_use_is_reported() {
    let found = findings(&guarded_use(false));

    assert_eq!(summary(&found), vec![(2, 0, 6, 11)]);
    assert_eq!(found[0].local.as_deref(), Some("count"));
    assert_eq!(
        found[0].message,
        "assignment to `count` could be moved into the block at [6, 11) that uses it"
    );
}

#[test]
fn test_scenario_b_enclosing_loop_suppresses_report() {
    assert!(findings(&guarded_use(true)).is_empty());
}

#[test]
fn test_scenario_c_handler_store_is_ignored() {
    let method = MethodBuilder::new("scenario", "()V")
        .label("start")
        .invoke_static("com/acme/Jobs", "run", "()V")
        .label("end")
        .goto("after")
        .label("handler")
        .store(1)
        .label("e")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("after")
        .load(1)
        .other(1, 0)
        .label("after")
        .return_void()
        .try_range("start", "end", "handler")
        .local(1, "failure", "Ljava/lang/Exception;", "e", "after")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    assert!(detector.context().unwrap().ignored().contains(&1));
    assert!(detector.findings(&method).is_empty());
}

fn switch_reading(case_a: &[u16], case_b: &[u16]) -> MethodBody {
    let mut builder = MethodBuilder::new("scenario", "()V")
        .const_int(1)
        .store(1)
        .label("l1")
        .invoke_static("com/acme/Keys", "key", "()I")
        .switch("end", &["a", "b"])
        .label("a");
    for &slot in case_a {
        builder = builder.load(slot).other(1, 0);
    }
    builder = builder.goto("end").label("b");
    for &slot in case_b {
        builder = builder.load(slot).other(1, 0);
    }
    builder
        .goto("end")
        .label("end")
        .return_void()
        .local(1, "first", "I", "l1", "end")
        .build()
}

#[test]
fn test_scenario_d_slot_read_by_one_case_is_reported() {
    let found = findings(&switch_reading(&[1], &[]));
    assert_eq!(summary(&found), vec![(2, 1, 26, 31)]);
}

#[test]
fn test_scenario_d_slot_read_by_two_cases_is_not_reported() {
    assert!(findings(&switch_reading(&[1], &[1])).is_empty());
}

#[test]
fn test_scenario_d_distinct_slots_per_case() {
    let method = MethodBuilder::new("scenario", "()V")
        .const_int(1)
        .store(1)
        .label("l1")
        .const_int(2)
        .store(2)
        .label("l2")
        .const_int(3)
        .store(3)
        .label("l3")
        .invoke_static("com/acme/Keys", "key", "()I")
        .switch("end", &["a", "b", "c"])
        .label("a")
        .load(1)
        .other(1, 0)
        .goto("end")
        .label("b")
        .load(2)
        .other(1, 0)
        .goto("end")
        .label("c")
        .load(3)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(1, "first", "I", "l1", "end")
        .local(2, "second", "I", "l2", "end")
        .local(3, "third", "I", "l3", "end")
        .build();

    let found = findings(&method);

    assert_eq!(
        summary(&found),
        vec![(2, 1, 36, 41), (5, 2, 41, 46), (8, 3, 46, 48)]
    );
}

#[test]
fn test_write_before_while_loop_is_not_reported() {
    let method = MethodBuilder::new("loop", "()V")
        .const_int(0)
        .store(0)
        .label("v")
        .label("top")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(0)
        .other(1, 0)
        .goto("top")
        .label("end")
        .return_void()
        .local(0, "total", "I", "v", "end")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    let tree = detector.tree().unwrap();
    assert_eq!(tree.render(), "[0, 15)\n  [6, 14) loop\n");
    assert!(detector.findings(&method).is_empty());
}

#[test]
fn test_write_before_bottom_tested_loop_is_not_reported() {
    // goto COND; BODY: use(total); COND: if (enabled()) goto BODY
    let method = MethodBuilder::new("loop", "()V")
        .const_int(0)
        .store(0)
        .label("v")
        .goto("cond")
        .label("body")
        .load(0)
        .other(1, 0)
        .label("cond")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("body")
        .label("end")
        .return_void()
        .local(0, "total", "I", "v", "end")
        .build();

    assert!(findings(&method).is_empty());
}

#[test]
fn test_write_and_read_in_same_scope_is_not_reported() {
    let method = MethodBuilder::new("same", "()V")
        .const_int(1)
        .store(0)
        .label("v")
        .load(0)
        .other(1, 0)
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(0)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "count", "I", "v", "end")
        .build();

    assert!(findings(&method).is_empty());
}

#[test]
fn test_use_in_both_branches_is_not_reported() {
    let method = MethodBuilder::new("branches", "()V")
        .const_int(1)
        .store(0)
        .label("v")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("else")
        .load(0)
        .other(1, 0)
        .goto("end")
        .label("else")
        .load(0)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "count", "I", "v", "end")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    assert_eq!(
        detector.tree().unwrap().render(),
        "[0, 17)\n  [6, 14)\n  [14, 16) goto\n"
    );
    assert!(detector.findings(&method).is_empty());
}

#[test]
fn test_write_after_null_constant_is_not_reported() {
    let method = MethodBuilder::new("nulls", "()V")
        .const_null()
        .store(0)
        .label("v")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(0)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "name", "Ljava/lang/String;", "v", "end")
        .build();

    assert!(findings(&method).is_empty());
}

#[test]
fn test_unnamed_local_is_not_reported() {
    let mut method = guarded_use(false);
    method.local_variables = None;
    assert!(findings(&method).is_empty());
}

/// Item item = items.first(); [items.clear();] if (enabled()) { use(item); }
fn fetched_then(clear: bool) -> MethodBody {
    let mut builder = MethodBuilder::new("fetch", "(Lcom/acme/Items;)V")
        .load(0)
        .invoke_virtual("com/acme/Items", "first", "()Lcom/acme/Item;")
        .store(1)
        .label("item");
    if clear {
        builder = builder
            .load(0)
            .invoke_virtual("com/acme/Items", "clear", "()V");
    }
    builder
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(1)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(1, "item", "Lcom/acme/Item;", "item", "end")
        .build()
}

#[test]
fn test_fetched_value_is_reported_while_source_untouched() {
    assert_eq!(findings(&fetched_then(false)).len(), 1);
}

#[test]
fn test_call_on_source_object_cancels_report() {
    assert!(findings(&fetched_then(true)).is_empty());
}

#[test]
fn test_risky_call_result_is_not_reported() {
    let method = MethodBuilder::new("timed", "()V")
        .invoke_static("java/lang/System", "nanoTime", "()J")
        .store(0)
        .label("v")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(0)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "started", "J", "v", "end")
        .build();

    assert!(findings(&method).is_empty());
}

#[test]
fn test_was_null_check_suppresses_method() {
    let method = MethodBuilder::new("row", "(Ljava/sql/ResultSet;)V")
        .const_int(5)
        .store(1)
        .label("v")
        .load(0)
        .invoke(InvokeKind::Interface, "java/sql/ResultSet", "wasNull", "()Z")
        .pop()
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(1)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(1, "count", "I", "v", "end")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    assert!(detector.context().unwrap().is_suppressed());
    assert!(detector.findings(&method).is_empty());
}

#[test]
fn test_store_under_lock_is_not_reported() {
    let method = MethodBuilder::new("locked", "()V")
        .invoke_static("com/acme/Locks", "get", "()Ljava/lang/Object;")
        .monitor_enter()
        .const_int(1)
        .store(0)
        .label("v")
        .invoke_static("com/acme/Locks", "get", "()Ljava/lang/Object;")
        .monitor_exit()
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(0)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "count", "I", "v", "end")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    let tree = detector.tree().unwrap();
    assert!(tree.render().contains("[3, 10) sync"), "{}", tree.render());
    assert!(detector.findings(&method).is_empty());
}

#[test]
fn test_configured_store_type_is_not_reported() {
    let method = MethodBuilder::new("pending", "()V")
        .const_int(5)
        .store(0)
        .label("v")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(0)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "ticket", "Lcom/acme/Ticket;", "v", "end")
        .build();
    assert_eq!(findings(&method).len(), 1);

    let config = narrowscope::config::RiskConfig {
        store_types: vec!["Lcom/acme/Ticket;".into()],
        ..Default::default()
    };
    let policy = RiskPolicy::from_config(&config).unwrap();
    assert!(analyze_method(&method, &policy).unwrap().is_empty());
}

/// int v = 5; int w = 7; if (a) { x(); } else { use(w); if (b) { use(v); } }
#[test]
fn test_condition_inside_else_part_collapses_it() {
    let method = MethodBuilder::new("scenario", "()V")
        .const_int(5)
        .store(1)
        .label("v")
        .const_int(7)
        .store(2)
        .label("w")
        .invoke_static(FLAGS, "a", "()Z")
        .if_false("else")
        .invoke_static("com/acme/Jobs", "x", "()V")
        .goto("end")
        .label("else")
        .load(2)
        .other(1, 0)
        .invoke_static(FLAGS, "b", "()Z")
        .if_false("end")
        .load(1)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(1, "v", "I", "v", "end")
        .local(2, "w", "I", "w", "end")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    let tree = detector.tree().unwrap();
    assert_eq!(tree.render(), "[0, 29)\n  [9, 18)\n  [23, 28)\n");
    assert!(tree.block(tree.root()).reads().contains_key(&2));
    assert_eq!(summary(&detector.findings(&method)), vec![(2, 1, 23, 28)]);
}

/// int v = 5; try { if (c) use(v); } catch (Exception e) {}
fn guarded_use_in_try(protected: bool) -> MethodBody {
    let builder = MethodBuilder::new("scenario", "()V")
        .const_int(5)
        .store(1)
        .label("start")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end_try")
        .load(1)
        .other(1, 0)
        .label("end_try")
        .goto("after")
        .label("handler")
        .pop()
        .label("after")
        .return_void()
        .local(1, "v", "I", "start", "after");
    let builder = if protected {
        builder.try_range("start", "end_try", "handler")
    } else {
        builder
    };
    builder.build()
}

#[test]
fn test_use_inside_try_body_is_not_reported() {
    let method = guarded_use_in_try(true);
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    let tree = detector.tree().unwrap();
    assert!(tree.render().contains("[3, 14) try"), "{}", tree.render());
    assert!(detector.findings(&method).is_empty());
    assert_eq!(summary(&findings(&guarded_use_in_try(false))), vec![(2, 1, 6, 11)]);
}

#[test]
fn test_range_with_earlier_handler_opens_no_try_block() {
    let method = MethodBuilder::new("scenario", "()V")
        .const_int(5)
        .store(1)
        .label("v")
        .label("handler")
        .invoke_static(FLAGS, "enabled", "()Z")
        .label("start")
        .if_false("end")
        .load(1)
        .other(1, 0)
        .label("end")
        .return_void()
        .try_range("start", "end", "handler")
        .local(1, "v", "I", "v", "end")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    assert!(!detector.tree().unwrap().render().contains("try"));
    assert_eq!(summary(&detector.findings(&method)), vec![(2, 1, 6, 11)]);
}

#[test]
fn test_synthetic_method_is_skipped() {
    let method = MethodBuilder::new("lambda$run$0", "()V")
        .synthetic()
        .const_int(5)
        .store(0)
        .label("v")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(0)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "count", "I", "v", "end")
        .build();
    let policy = RiskPolicy::default();

    assert!(!ScopeNarrowingDetector::new(&policy).begin_method(&method));
    assert!(findings(&method).is_empty());
}

/// void run(int limit) { limit = 5; int count = 6; if (enabled()) { use(limit); use(count); } }
#[test]
fn test_receiver_and_parameters_are_never_reported() {
    let method = MethodBuilder::new("run", "(I)V")
        .instance()
        .label("top")
        .const_int(5)
        .store(1)
        .const_int(6)
        .store(2)
        .label("v")
        .invoke_static(FLAGS, "enabled", "()Z")
        .if_false("end")
        .load(1)
        .other(1, 0)
        .load(2)
        .other(1, 0)
        .label("end")
        .return_void()
        .local(0, "this", "Lcom/acme/Job;", "top", "end")
        .local(1, "limit", "I", "top", "end")
        .local(2, "count", "I", "v", "end")
        .build();
    let policy = RiskPolicy::default();

    let detector = walk(&method, &policy);

    let ignored = detector.context().unwrap().ignored();
    assert!(ignored.contains(&0) && ignored.contains(&1));
    assert_eq!(summary(&detector.findings(&method)), vec![(5, 2, 9, 16)]);
}
