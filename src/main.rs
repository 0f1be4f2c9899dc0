// main.rs
//
// Minimal tour of the kernel: build two solids from meshes, run each boolean
// operation, print the measurements and write the results as STL.

use bspcsg::{BooleanOps, BuildContext, BuildParameters, Operation, Solid, shapes};
use nalgebra::Matrix4;
use std::fs;

fn main() {
    // Ensure the /stl folder exists
    let _ = fs::create_dir_all("stl");

    // operands share one internal frame: caller space
    let params = BuildParameters::default().with_internal_transform(Matrix4::identity());
    let cube = match Solid::from_mesh(&shapes::cube(2.0), &params, BuildContext::default()) {
        Ok(solid) => solid.translate(-1.0, -1.0, -1.0),
        Err(error) => {
            eprintln!("cube: {error}");
            return;
        },
    };
    let sphere = match Solid::from_mesh(&shapes::sphere(1.3, 32, 16), &params, BuildContext::default()) {
        Ok(solid) => solid,
        Err(error) => {
            eprintln!("sphere: {error}");
            return;
        },
    };

    // Combine once and collapse the same combined tree with several operators
    let mut combined = cube.clone();
    if let Err(error) = combined.combine(&sphere) {
        eprintln!("combine: {error}");
        return;
    }

    for (name, operation) in [
        ("union", Operation::Union),
        ("intersection", Operation::Intersection),
        ("difference", Operation::AMinusB),
        ("xor", Operation::SymmetricDifference),
    ] {
        let result = match combined.op(operation) {
            Ok(result) => result,
            Err(error) => {
                eprintln!("{name}: {error}");
                continue;
            },
        };
        if let Ok(measure) = result.surface_area_and_volume(true, None) {
            println!("{name:>12}: area {:.4}, volume {:.4}", measure.area, measure.volume);
        }
        if let Ok(bytes) = result.to_stl_binary() {
            let _ = fs::write(format!("stl/{name}.stl"), bytes);
        }
    }

    // Islands of a difference that cuts the cube in two
    let slab = Solid::from_mesh(&shapes::cuboid(0.2, 4.0, 4.0), &params, BuildContext::default())
        .map(|slab| slab.translate(-0.1, -2.0, -2.0));
    if let Ok(slab) = slab {
        if let Ok(halves) = cube.difference(&slab).and_then(|cut| cut.decompose_into_islands()) {
            println!("cut cube has {} islands", halves.len());
            for (index, half) in halves.iter().enumerate() {
                if let Ok(bytes) = half.to_stl_binary() {
                    let _ = fs::write(format!("stl/half_{index}.stl"), bytes);
                }
            }
        }
    }

    // Persist and reload the union
    if let Ok(union) = combined.op(Operation::Union) {
        let mut bytes = Vec::new();
        if union.serialize(&mut bytes).is_ok() {
            let _ = fs::write("stl/union.bsp", &bytes);
            if let Ok(reloaded) = Solid::deserialize(&mut bytes.as_slice()) {
                println!("reloaded union: {:?} with {} planes", reloaded.get_type(), reloaded.planes().len());
            }
        }
    }
}
