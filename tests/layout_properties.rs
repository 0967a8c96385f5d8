//! Property tests for auto-layout through the public API.
//!
//! The fixture is a small LED driver with power labels, pin-to-pin wiring,
//! a direct pin contact and a template, placed well away from the layout
//! area so new positions can never touch old wiring by accident.

use schematic_layout_mcp::schematic::{
    apply_layout, auto_layout, plan_layout, to_document_space, ComponentSpec, LayoutConfig,
    LayoutOutcome, LayoutStrategy, NetIndex, Pin, PinRef, Placement, Point, Rotation, Routing,
    SafetyMode, SchematicDocument, SchematicError, SymbolDef, WiringMode,
};

fn pt(x: f64, y: f64) -> Point {
    Point::from_mm(x, y).expect("valid coordinate")
}

fn symbol(library: &str, name: &str, pins: Vec<Pin>) -> SymbolDef {
    SymbolDef {
        library: library.to_string(),
        symbol: name.to_string(),
        pins,
    }
}

fn place(doc: &mut SchematicDocument, reference: &str, lib_id: (&str, &str), at: Point) {
    doc.upsert_component(ComponentSpec::new(reference, lib_id.0, lib_id.1, "", at))
        .expect("component created");
}

fn led_driver() -> SchematicDocument {
    let mut doc = SchematicDocument::new("led driver");
    let defs = [
        symbol(
            "Device",
            "R",
            vec![Pin::new("1", "", pt(0.0, 3.81)), Pin::new("2", "", pt(0.0, -3.81))],
        ),
        symbol(
            "Device",
            "LED",
            vec![Pin::new("1", "K", pt(-3.81, 0.0)), Pin::new("2", "A", pt(3.81, 0.0))],
        ),
        symbol(
            "Connector",
            "Conn_01x02",
            vec![Pin::new("1", "", pt(-5.08, 1.27)), Pin::new("2", "", pt(-5.08, -1.27))],
        ),
        symbol("power", "VCC", vec![Pin::new("1", "VCC", Point::ZERO)]),
    ];
    for def in defs {
        doc.define_symbol(def).expect("symbol defined");
    }

    place(&mut doc, "#PWR01", ("power", "VCC"), pt(101.6, 91.44));
    place(&mut doc, "J1", ("Connector", "Conn_01x02"), pt(96.52, 101.6));
    place(&mut doc, "R1", ("Device", "R"), pt(127.0, 101.6));
    place(&mut doc, "D1", ("Device", "LED"), pt(139.7, 114.3));
    // R2 pin 1 lands exactly on D1's cathode.
    place(&mut doc, "R2", ("Device", "R"), pt(135.89, 118.11));
    place(&mut doc, "_TEMPLATE_Device_R", ("Device", "R"), pt(254.0, 254.0));

    for (reference, pin, net) in [
        ("#PWR01", "1", "VCC"),
        ("J1", "1", "VCC"),
        ("R1", "1", "VCC"),
        ("J1", "2", "GND"),
        ("D1", "K", "GND"),
        ("R2", "2", "SENSE"),
    ] {
        doc.connect_to_net(reference, pin, net).expect("pin attached");
    }
    doc.connect_pins(("R1", "2"), ("D1", "A"), Routing::OrthogonalV)
        .expect("pins wired");
    doc
}

fn positions(doc: &SchematicDocument) -> Vec<(String, Point)> {
    doc.components()
        .map(|c| (c.reference.clone(), c.position))
        .collect()
}

fn member(reference: &str, pin: &str) -> PinRef {
    PinRef::new(reference, pin)
}

fn assert_same_nets(before: &NetIndex, after: &NetIndex) {
    assert_eq!(before.len(), after.len());
    for net in before.nets() {
        assert_eq!(
            after.members(&net.name),
            Some(&net.members),
            "net {} changed",
            net.name
        );
    }
}

#[test]
fn fixture_has_the_expected_nets() {
    let index = NetIndex::build(&led_driver());

    let vcc = index.members("VCC").unwrap();
    assert!(vcc.contains(&member("#PWR01", "1")));
    assert!(vcc.contains(&member("J1", "1")));
    assert!(vcc.contains(&member("R1", "1")));

    let gnd = index.members("GND").unwrap();
    assert_eq!(gnd.len(), 3);
    assert!(gnd.contains(&member("R2", "1")));

    assert_eq!(index.members("SENSE").unwrap().len(), 1);
    let led = index.net_of(&member("D1", "2")).unwrap();
    assert!(led.members.contains(&member("R1", "2")));
    assert!(!index.nets().any(|n| n.members.iter().any(|m| m.reference.starts_with("_TEMPLATE_"))));
}

// =============================================================================
// Round-trip connectivity
// =============================================================================

#[test]
fn safe_layout_keeps_every_net_for_each_strategy() {
    let configs = [
        LayoutConfig::default(),
        LayoutConfig {
            strategy: LayoutStrategy::Grouped,
            ..LayoutConfig::default()
        },
        LayoutConfig {
            columns: Some(1),
            ..LayoutConfig::default()
        },
        LayoutConfig {
            include: Some("^(R|D)".to_string()),
            ..LayoutConfig::default()
        },
        LayoutConfig {
            grid: 1.27,
            x_origin: 10.0,
            y_origin: 12.7,
            ..LayoutConfig::default()
        },
    ];

    for config in configs {
        let mut doc = led_driver();
        let before = NetIndex::build(&doc);

        let outcome = auto_layout(&mut doc, &config).unwrap();
        let LayoutOutcome::Applied(report) = outcome else {
            panic!("layout with {config:?} did not apply: {outcome:?}");
        };
        assert_eq!(report.mode, SafetyMode::Safe);
        assert_eq!(report.nets_verified, before.len());
        assert!(report.moved_count > 0);
        assert_same_nets(&before, &NetIndex::build(&doc));
    }
}

#[test]
fn fixed_components_and_their_wiring_stay_put() {
    let mut doc = led_driver();
    doc.set_fixed("J1", true).unwrap();
    let j1_before = doc.component("J1").unwrap().position;
    let before = NetIndex::build(&doc);

    let LayoutOutcome::Applied(report) = auto_layout(&mut doc, &LayoutConfig::default()).unwrap()
    else {
        panic!("expected layout to apply");
    };
    assert!(report.moves.iter().all(|m| m.reference != "J1"));
    assert_eq!(doc.component("J1").unwrap().position, j1_before);
    assert_eq!(
        doc.component("_TEMPLATE_Device_R").unwrap().position,
        pt(254.0, 254.0)
    );
    assert_same_nets(&before, &NetIndex::build(&doc));
}

#[test]
fn second_layout_moves_nothing() {
    let mut doc = led_driver();
    auto_layout(&mut doc, &LayoutConfig::default()).unwrap();
    let settled = positions(&doc);

    let LayoutOutcome::Applied(report) = auto_layout(&mut doc, &LayoutConfig::default()).unwrap()
    else {
        panic!("expected layout to apply");
    };
    assert_eq!(report.moved_count, 0);
    assert_eq!(positions(&doc), settled);
}

// =============================================================================
// Grid exactness
// =============================================================================

#[test]
fn planned_positions_lie_on_the_layout_grid() {
    let doc = led_driver();
    for (grid, origin) in [(2.54, 20.0), (1.27, 10.0), (5.0, 3.3)] {
        let config = LayoutConfig {
            grid,
            x_origin: origin,
            y_origin: origin,
            row_spacing: 17.0,
            column_spacing: 41.0,
            ..LayoutConfig::default()
        };
        let size = pt(grid, 0.0).x;
        let base = pt(origin, origin);
        let plan = plan_layout(&doc, &config).unwrap();
        assert_eq!(plan.len(), 5);
        for p in plan {
            assert_eq!((p.position.x - base.x).rem_euclid(size), 0, "{p:?}");
            assert_eq!((p.position.y - base.y).rem_euclid(size), 0, "{p:?}");
        }
    }
}

// =============================================================================
// Idempotent creation
// =============================================================================

#[test]
fn repeated_creation_leaves_one_identical_component() {
    let mut once = led_driver();
    let mut twice = led_driver();
    let spec = ComponentSpec::new("C1", "Device", "C", "100n", pt(152.4, 101.6))
        .with_pins(vec![Pin::new("1", "", pt(0.0, 2.54)), Pin::new("2", "", pt(0.0, -2.54))]);

    once.upsert_component(spec.clone()).unwrap();
    twice.upsert_component(spec.clone()).unwrap();
    twice.upsert_component(spec).unwrap();

    assert_eq!(once.component_count(), twice.component_count());
    assert_eq!(once.component("C1"), twice.component("C1"));
    assert_eq!(positions(&once), positions(&twice));
}

#[test]
fn repeated_template_instantiation_and_labels_are_no_ops() {
    let mut doc = led_driver();
    let at = pt(165.1, 101.6);
    doc.instantiate_template("_TEMPLATE_Device_R", "R3", Some("1k"), at)
        .unwrap();
    let snapshot = doc.clone();

    doc.instantiate_template("_TEMPLATE_Device_R", "R3", Some("1k"), at)
        .unwrap();
    assert!(!doc.add_label("VCC", doc.pin_position("R1", "1").unwrap() + pt(0.0, -2.54)));
    assert!(!doc.connect_to_net("R1", "1", "VCC").unwrap());
    assert_eq!(doc, snapshot);
}

// =============================================================================
// Coordinate transform
// =============================================================================

#[test]
fn pin_offsets_are_flipped_into_document_space() {
    assert_eq!(
        to_document_space(pt(0.0, 5.0), pt(10.0, 10.0), Rotation::R0),
        pt(10.0, 5.0)
    );
    assert_eq!(
        to_document_space(pt(0.0, 5.0), pt(10.0, 10.0), Rotation::R90),
        pt(5.0, 10.0)
    );

    let mut doc = SchematicDocument::new("transform");
    doc.upsert_component(
        ComponentSpec::new("U1", "Lib", "X", "", pt(10.0, 10.0))
            .with_pins(vec![Pin::new("1", "IN", pt(0.0, 5.0))]),
    )
    .unwrap();
    assert_eq!(doc.pin_position("U1", "1").unwrap(), pt(10.0, 5.0));
    assert_eq!(doc.pin_position("U1", "IN").unwrap(), pt(10.0, 5.0));
}

// =============================================================================
// Safety gate
// =============================================================================

#[test]
fn layout_without_preservation_is_refused_by_default() {
    let mut doc = led_driver();
    let before = doc.clone();
    let config = LayoutConfig {
        preserve_connectivity: false,
        ..LayoutConfig::default()
    };

    assert_eq!(auto_layout(&mut doc, &config).unwrap(), LayoutOutcome::Refused);
    assert_eq!(doc, before);
}

#[test]
fn unconnected_document_may_be_laid_out_unsafely() {
    let mut doc = SchematicDocument::new("loose");
    for (reference, x) in [("R1", 101.6), ("R2", 127.0)] {
        doc.upsert_component(
            ComponentSpec::new(reference, "Device", "R", "", pt(x, 101.6))
                .with_pins(vec![Pin::new("1", "", pt(0.0, 3.81))]),
        )
        .unwrap();
    }
    let config = LayoutConfig {
        preserve_connectivity: false,
        ..LayoutConfig::default()
    };

    let LayoutOutcome::Applied(report) = auto_layout(&mut doc, &config).unwrap() else {
        panic!("expected layout to apply");
    };
    assert_eq!(report.mode, SafetyMode::Unsafe);
    assert_eq!(report.moved_count, 2);
}

// =============================================================================
// Violation detection
// =============================================================================

#[test]
fn moving_without_regeneration_is_a_violation_and_rolls_back() {
    let mut doc = led_driver();
    let before = doc.clone();
    let moved = [Placement {
        reference: "R1".to_string(),
        position: pt(20.0, 20.0),
        rotation: Rotation::R0,
    }];

    let err = apply_layout(&mut doc, &moved, WiringMode::PositionsOnly).unwrap_err();
    let SchematicError::ConnectivityViolation { nets } = err else {
        panic!("expected a connectivity violation, got {err:?}");
    };
    assert!(nets.contains(&"VCC".to_string()));
    let led = NetIndex::build(&before)
        .net_of(&member("R1", "2"))
        .unwrap()
        .name
        .clone();
    assert!(nets.contains(&led));
    assert_eq!(doc, before);
}

#[test]
fn same_move_with_regeneration_succeeds() {
    let mut doc = led_driver();
    let before = NetIndex::build(&doc);
    let moved = [Placement {
        reference: "R1".to_string(),
        position: pt(20.0, 20.0),
        rotation: Rotation::R90,
    }];

    let report = apply_layout(&mut doc, &moved, WiringMode::Regenerate).unwrap();
    assert_eq!(report.moved_count, 1);
    assert_eq!(report.rotated_count, 1);
    assert_same_nets(&before, &NetIndex::build(&doc));
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn identical_inputs_give_identical_layouts() {
    for strategy in [LayoutStrategy::Grid, LayoutStrategy::Grouped] {
        let config = LayoutConfig {
            strategy,
            ..LayoutConfig::default()
        };
        let mut a = led_driver();
        let mut b = led_driver();

        let (LayoutOutcome::Applied(ra), LayoutOutcome::Applied(rb)) = (
            auto_layout(&mut a, &config).unwrap(),
            auto_layout(&mut b, &config).unwrap(),
        ) else {
            panic!("expected both layouts to apply");
        };
        assert_eq!(ra.moved_count, rb.moved_count);
        assert_eq!(ra.moves, rb.moves);
        assert_eq!(positions(&a), positions(&b));
    }
}
