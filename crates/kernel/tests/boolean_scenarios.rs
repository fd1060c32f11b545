//! End-to-end Boolean runs on boxes and cylinders.

use std::f64::consts::PI;

use approx::assert_relative_eq;

use bop_kernel::geometry::point::Point3d;
use bop_kernel::geometry::vector::Vec3;
use bop_kernel::measure::solid_volume;
use bop_kernel::topology::explore::subshapes;
use bop_kernel::topology::primitives::{make_box, make_cylinder};
use bop_kernel::validation::check_shape;
use bop_kernel::{
    AlertCode, BooleanAlgo, BooleanEngine, BooleanOperation, BooleanOptions, BooleanOutcome, DefaultBooleanEngine,
    GeneralFuse, ShapeId, ShapeKind, ShapeStore,
};

fn unit_box(store: &mut ShapeStore, x: f64, y: f64, z: f64) -> ShapeId {
    make_box(store, Point3d::new(x, y, z), Point3d::new(x + 1.0, y + 1.0, z + 1.0))
}

fn perform(store: &mut ShapeStore, op: BooleanOperation, objects: Vec<ShapeId>, tools: Vec<ShapeId>) -> BooleanOutcome {
    let outcome = BooleanAlgo::new(op)
        .objects(objects)
        .tools(tools)
        .options(BooleanOptions::sequential())
        .perform(store);
    assert!(outcome.report.is_done(), "{}", outcome.report);
    outcome
}

fn count(store: &ShapeStore, shape: ShapeId, kind: ShapeKind) -> usize {
    subshapes(store, shape, kind).unwrap().len()
}

#[test]
fn touching_cubes_fuse_into_one_solid() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let b = unit_box(&mut store, 1.0, 0.0, 0.0);
    let outcome = perform(&mut store, BooleanOperation::Fuse, vec![a], vec![b]);
    let result = outcome.result.unwrap();

    assert_eq!(store.kind(result).unwrap(), ShapeKind::Solid);
    assert_eq!(count(&store, result, ShapeKind::Shell), 1);
    assert_eq!(count(&store, result, ShapeKind::Face), 10);
    assert_relative_eq!(solid_volume(&store, result).unwrap(), 2.0, epsilon = 1e-9);
    let check = check_shape(&store, result).unwrap();
    assert!(check.valid, "{:?}", check.errors);
    assert!(!outcome.report.has_warnings(), "{}", outcome.report);
}

#[test]
fn common_of_offset_cubes() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let b = unit_box(&mut store, 0.5, 0.5, 0.5);
    let outcome = perform(&mut store, BooleanOperation::Common, vec![a], vec![b]);
    let result = outcome.result.unwrap();

    assert_relative_eq!(solid_volume(&store, result).unwrap(), 0.125, epsilon = 1e-9);
    assert_eq!(count(&store, result, ShapeKind::Face), 6);
    assert_eq!(count(&store, result, ShapeKind::Vertex), 8);
    assert!(check_shape(&store, result).unwrap().valid);
}

#[test]
fn cut_through_cube_leaves_notched_solid() {
    let mut store = ShapeStore::new();
    let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0));
    let b = make_box(&mut store, Point3d::new(0.5, -1.0, 1.0), Point3d::new(1.5, 3.0, 3.0));
    let outcome = perform(&mut store, BooleanOperation::Cut, vec![a], vec![b]);
    let result = outcome.result.unwrap();

    assert_relative_eq!(solid_volume(&store, result).unwrap(), 8.0 - 2.0, epsilon = 1e-9);
    assert_eq!(store.kind(result).unwrap(), ShapeKind::Solid);
    assert!(check_shape(&store, result).unwrap().valid);
    // The slot floor and walls come from the tool, reversed.
    let states = &outcome.states;
    assert!(states.values().any(|s| *s == bop_kernel::classify::FaceState::In));
}

#[test]
fn fuse_of_shape_with_itself_is_the_shape() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let outcome = perform(&mut store, BooleanOperation::Fuse, vec![a], vec![a]);
    let result = outcome.result.unwrap();
    assert!(outcome.report.has_code(AlertCode::DuplicateArgument));
    assert_relative_eq!(solid_volume(&store, result).unwrap(), 1.0, epsilon = 1e-9);
    assert_eq!(count(&store, result, ShapeKind::Face), 6);

    // Two distinct but identical boxes keep the faces of the first.
    let b = unit_box(&mut store, 0.0, 0.0, 0.0);
    let outcome = perform(&mut store, BooleanOperation::Fuse, vec![a], vec![b]);
    let result = outcome.result.unwrap();
    let faces = subshapes(&store, result, ShapeKind::Face).unwrap();
    let faces_a = subshapes(&store, a, ShapeKind::Face).unwrap();
    assert_eq!(faces.len(), 6);
    assert!(faces.iter().all(|f| faces_a.contains(f)));
    assert!(outcome.history.is_deleted(subshapes(&store, b, ShapeKind::Face).unwrap()[0]));
}

#[test]
fn fuse_of_half_offset_cubes_is_one_closed_solid() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let b = unit_box(&mut store, 0.5, 0.5, 0.5);
    let outcome = perform(&mut store, BooleanOperation::Fuse, vec![a], vec![b]);
    let result = outcome.result.unwrap();
    assert!(!outcome.report.has_code(AlertCode::OpenShell), "{}", outcome.report);
    assert_eq!(store.kind(result).unwrap(), ShapeKind::Solid);
    assert_eq!(count(&store, result, ShapeKind::Face), 12);
    assert_relative_eq!(solid_volume(&store, result).unwrap(), 1.875, epsilon = 1e-9);
    assert!(check_shape(&store, result).unwrap().valid);
}

#[test]
fn fuse_of_several_objects_drops_internal_faces() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let b = unit_box(&mut store, 0.5, 0.5, 0.5);
    let outcome = perform(&mut store, BooleanOperation::Fuse, vec![a, b], vec![]);
    let result = outcome.result.unwrap();
    assert_eq!(store.kind(result).unwrap(), ShapeKind::Solid);
    assert_relative_eq!(solid_volume(&store, result).unwrap(), 1.875, epsilon = 1e-9);
}

#[test]
fn disjoint_common_is_empty() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let b = unit_box(&mut store, 5.0, 0.0, 0.0);
    let outcome = perform(&mut store, BooleanOperation::Common, vec![a], vec![b]);
    let result = outcome.result.unwrap();
    assert!(store.children(result).unwrap().is_empty());
    assert!(outcome.report.has_code(AlertCode::EmptyResult));
}

#[test]
fn box_with_cylindrical_hole() {
    let mut store = ShapeStore::new();
    let plate = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 1.0));
    let pin = make_cylinder(&mut store, Point3d::new(1.0, 1.0, -0.5), Vec3::Z, 0.5, 2.0);
    let hole = PI * 0.25;

    let cut = perform(&mut store, BooleanOperation::Cut, vec![plate], vec![pin]).result.unwrap();
    assert_relative_eq!(solid_volume(&store, cut).unwrap(), 4.0 - hole, max_relative = 1e-3);
    assert!(check_shape(&store, cut).unwrap().valid);

    let common = perform(&mut store, BooleanOperation::Common, vec![plate], vec![pin]).result.unwrap();
    assert_relative_eq!(solid_volume(&store, common).unwrap(), hole, max_relative = 1e-3);

    let fuse = perform(&mut store, BooleanOperation::Fuse, vec![plate], vec![pin]).result.unwrap();
    assert_relative_eq!(solid_volume(&store, fuse).unwrap(), 4.0 + hole, max_relative = 1e-3);
}

#[test]
fn section_of_plate_and_cylinder_traces_two_circles() {
    let mut store = ShapeStore::new();
    let plate = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 1.0));
    let pin = make_cylinder(&mut store, Point3d::new(1.0, 1.0, -0.5), Vec3::Z, 0.5, 2.0);
    let section = DefaultBooleanEngine::new(BooleanOptions::sequential())
        .section(&mut store, plate, pin)
        .unwrap();
    assert_eq!(store.kind(section).unwrap(), ShapeKind::Compound);
    assert_eq!(count(&store, section, ShapeKind::Face), 0);
    let edges = subshapes(&store, section, ShapeKind::Edge).unwrap();
    assert!(edges.len() >= 2);
    let length: f64 = edges
        .iter()
        .map(|e| {
            let (curve, range) = store.edge_curve(*e).unwrap();
            curve.approximate_length(range, 64)
        })
        .sum();
    // Circles of radius 0.5 at the top and bottom of the plate.
    assert_relative_eq!(length, 2.0 * PI, max_relative = 1e-3);
}

#[test]
fn general_fuse_splits_every_argument() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let b = unit_box(&mut store, 0.5, 0.5, 0.5);
    let c = unit_box(&mut store, 4.0, 0.0, 0.0);
    let outcome = GeneralFuse::new(vec![a, b, c])
        .options(BooleanOptions::sequential())
        .perform(&mut store);
    assert!(outcome.report.is_done());
    let result = outcome.result.unwrap();
    let parts = store.children(result).unwrap().to_vec();
    assert_eq!(parts.len(), 3);
    // The untouched box is passed through as is.
    assert_eq!(parts[2].id, c);
    assert_relative_eq!(solid_volume(&store, result).unwrap(), 3.0, epsilon = 1e-9);
    assert!(outcome.history.has_modified());
}

#[test]
fn engine_reports_typed_failures() {
    let mut store = ShapeStore::new();
    let a = unit_box(&mut store, 0.0, 0.0, 0.0);
    let b = unit_box(&mut store, 3.0, 0.0, 0.0);
    let engine = DefaultBooleanEngine::new(BooleanOptions::sequential());
    assert_eq!(engine.common(&mut store, a, b), Err(bop_kernel::BooleanFailure::EmptyResult));
    let fused = engine.fuse(&mut store, a, b).unwrap();
    assert_eq!(store.kind(fused).unwrap(), ShapeKind::Compound);
    assert_relative_eq!(solid_volume(&store, fused).unwrap(), 2.0, epsilon = 1e-9);
}
