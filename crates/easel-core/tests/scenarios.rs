//! End-to-end editing scenarios driven through the session API.

use easel_core::sync::CollabEvent;
use easel_core::{
    Alignment, Axis, CanvasSession, CollaborationManager, DiagramType, Element, ElementId,
    EngineConfig, Envelope, GroupMember, MemoryObjectStore, NodeContent, Scene, SerializableColor,
    load_scene, save_scene,
};
use kurbo::{Point, Size};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn session() -> CanvasSession {
    CanvasSession::new(
        EngineConfig::default(),
        Arc::new(MemoryObjectStore::new()),
        DiagramType::Flowchart,
    )
}

fn add(session: &mut CanvasSession, x: f64, y: f64) -> ElementId {
    session
        .add_node(NodeContent::default(), Point::new(x, y), Size::new(40.0, 40.0))
        .unwrap()
}

fn edges_are_consistent(scene: &Scene) -> bool {
    scene.edges().all(|edge| {
        let data = edge.as_edge().unwrap();
        scene.contains(data.source) && scene.contains(data.target)
    })
}

#[test]
fn test_delete_prunes_edge_and_undo_restores_empty_scene() {
    let mut s = session();
    let a = add(&mut s, 0.0, 0.0);
    let b = add(&mut s, 100.0, 100.0);
    let edge = s.connect(a, b).unwrap();
    s.remove_elements(&[a]).unwrap();

    assert!(!s.scene().contains(edge));
    assert!(s.scene().contains(b));
    assert!(edges_are_consistent(s.scene()));
    assert_eq!(s.history().len(), 4);

    for _ in 0..4 {
        assert!(s.undo());
    }
    assert!(s.scene().is_empty());
    assert!(!s.undo());
}

#[test]
fn test_distribute_horizontal_spaces_middle_node() {
    let mut s = session();
    let ids: Vec<ElementId> = [0.0, 50.0, 130.0].iter().map(|x| add(&mut s, *x, 0.0)).collect();
    s.distribute(&ids, Axis::Horizontal).unwrap();

    let x = |id: ElementId| s.scene().element(id).unwrap().position.x;
    assert!(x(ids[0]).abs() < 1e-9);
    assert!((x(ids[1]) - 65.0).abs() < 1e-9);
    assert!((x(ids[2]) - 130.0).abs() < 1e-9);
}

#[test]
fn test_group_survives_member_delete() {
    let mut s = session();
    let a = add(&mut s, 0.0, 0.0);
    let b = add(&mut s, 100.0, 0.0);
    let group = s.group(&[a, b]).unwrap();
    s.remove_elements(&[a]).unwrap();

    let members = &s.scene().group(group).unwrap().members;
    assert_eq!(members, &vec![GroupMember::Element(b)]);
}

#[test]
fn test_last_write_wins_in_either_order() {
    let base = Element::node(NodeContent::default(), Point::ZERO, Size::new(10.0, 10.0));
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
    let labelled = |label: &str| {
        let mut element = base.clone();
        element.label = label.to_string();
        element
    };
    let at = |origin, timestamp, element| Envelope {
        origin,
        timestamp,
        event: CollabEvent::ElementUpdated { element },
    };
    let t = 1_700_000_000_000;

    for reversed in [false, true] {
        let mut manager = CollaborationManager::new("observer", SerializableColor::black());
        let mut scene = Scene::new(DiagramType::Whiteboard).add_element(base.clone()).unwrap();
        let mut arrivals = vec![at(first, t, labelled("early")), at(second, t + 1, labelled("late"))];
        if reversed {
            arrivals.reverse();
        }
        for envelope in arrivals {
            manager.ingest(&mut scene, envelope, &HashSet::new());
        }
        assert_eq!(scene.element(base.id).unwrap().label, "late");
    }
}

#[test]
fn test_undo_redo_symmetry() {
    let mut s = session();
    let start = s.scene().clone();
    let a = add(&mut s, 0.0, 0.0);
    let b = add(&mut s, 100.0, 20.0);
    let c = add(&mut s, 220.0, 60.0);
    s.connect(a, b).unwrap();
    s.align(&[a, b, c], Alignment::Top).unwrap();
    s.group(&[b, c]).unwrap();
    s.duplicate(&[a]).unwrap();
    s.send_to_back(&[c]).unwrap();
    let end = s.scene().clone();
    let steps = s.history().len();
    assert_eq!(steps, 8);

    for _ in 0..steps {
        assert!(s.undo());
    }
    assert_eq!(s.scene(), &start);
    for _ in 0..steps {
        assert!(s.redo());
    }
    assert_eq!(s.scene(), &end);
}

#[test]
fn test_document_round_trip() {
    let mut s = session();
    let a = add(&mut s, 0.0, 0.0);
    let b = add(&mut s, 100.0, 0.0);
    s.connect(a, b).unwrap();
    s.group(&[a, b]).unwrap();
    s.pan(kurbo::Vec2::new(12.0, -4.0));

    let json = save_scene(s.scene()).unwrap();
    let (restored, report) = load_scene(&json).unwrap();
    assert!(report.is_clean());
    assert_eq!(&restored, s.scene());
}

#[test]
fn test_z_order_unique_after_add_and_duplicate() {
    let mut s = session();
    let a = add(&mut s, 0.0, 0.0);
    let b = add(&mut s, 60.0, 0.0);
    s.connect(a, b).unwrap();
    let copies = s.duplicate(&[a, b]).unwrap();
    s.duplicate(&copies).unwrap();
    add(&mut s, 0.0, 200.0);

    let mut seen = HashSet::new();
    assert!(s.scene().elements().all(|e| seen.insert(e.z_index)));
    assert_eq!(seen.len(), s.scene().len());
}

#[test]
fn test_align_is_idempotent() {
    let mut s = session();
    let ids: Vec<ElementId> = [(0.0, 10.0), (80.0, 40.0), (200.0, 0.0)]
        .iter()
        .map(|(x, y)| add(&mut s, *x, *y))
        .collect();
    s.align(&ids, Alignment::Middle).unwrap();
    let once = s.scene().clone();
    let entries = s.history().len();
    s.align(&ids, Alignment::Middle).unwrap();
    assert_eq!(s.scene(), &once);
    assert_eq!(s.history().len(), entries);
}
