// This file is part of Terravis.
//
// Terravis is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Terravis is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Terravis.  If not, see <http://www.gnu.org/licenses/>.
mod scene;

use crate::scene::{rolling_hills, HorizonQueries, Prop};
use anyhow::{ensure, Result};
use bin_terrain::{TerrainMesh, TerrainOpts};
use camera::Camera;
use frustvis::{MeshHandle, RenderView, VisibilityCuller, VisibilityObject};
use log::{debug, info};
use nalgebra::{Point3, Vector3};
use std::{
    f32::consts::{FRAC_PI_3, TAU},
    rc::Rc,
    time::{Duration, Instant},
};
use structopt::StructOpt;

/// Fly a camera around synthetic terrain, balancing the terrain mesh and
/// culling a field of objects every frame.
#[derive(Debug, StructOpt)]
struct Opt {
    /// Terrain cells along each side of the map.
    #[structopt(long, default_value = "4")]
    grid: u32,

    /// Number of frames to run.
    #[structopt(short, long, default_value = "120")]
    frames: u32,

    /// Number of objects scattered over the terrain.
    #[structopt(short, long, default_value = "500")]
    objects: u32,

    /// Seed for the terrain and object placement.
    #[structopt(long, default_value = "1")]
    seed: u64,

    /// Also cull objects hidden behind the terrain.
    #[structopt(long)]
    occlusion: bool,

    /// Camera height above the ground.
    #[structopt(long, default_value = "60")]
    altitude: f32,

    #[structopt(flatten)]
    terrain: TerrainOpts,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    ensure!(opt.grid > 0, "the terrain needs at least one cell");
    ensure!(opt.frames > 0, "nothing to do for zero frames");

    let rng = fastrand::Rng::with_seed(opt.seed);
    let size = opt.grid * opt.terrain.tile_size + 1;
    let extent = (size - 1) as f32;
    let mut terrain = TerrainMesh::new(Rc::new(rolling_hills(size, &rng)), opt.terrain.clone())?;
    info!(
        "terrain: {}x{} samples in {} tiles",
        size,
        size,
        terrain.tiles().len()
    );

    let mut culler = VisibilityCuller::new();
    let props = (0..opt.objects)
        .map(|i| {
            let (x, z) = (rng.f32() * extent, rng.f32() * extent);
            let half_extent = Vector3::new(2f32, 3f32, 2f32) * (1f32 + rng.f32());
            let velocity = if i % 4 == 0 {
                Vector3::new(rng.f32() - 0.5, 0f32, rng.f32() - 0.5)
            } else {
                Vector3::zeros()
            };
            let ground = Point3::new(x, terrain.height(x, z) + half_extent.y, z);
            Rc::new(Prop::new(ground, half_extent, i, velocity))
        })
        .collect::<Vec<_>>();
    for prop in &props {
        let object: Rc<dyn VisibilityObject> = prop.clone();
        culler.register(&object);
    }

    let mut camera = Camera::from_parameters(FRAC_PI_3, 16f32 / 9f32, 1f32, extent * 2f32);
    let center = Point3::new(extent / 2f32, 0f32, extent / 2f32);
    let radius = extent / 3f32;
    let orbit = |angle: f32| {
        let x = center.x + radius * angle.cos();
        let z = center.z + radius * angle.sin();
        (x, z)
    };

    let mut terrain_time = Duration::default();
    let mut cull_time = Duration::default();
    let mut visible_total = 0;
    for frame in 0..opt.frames {
        let angle = frame as f32 / opt.frames as f32 * TAU;
        let (x, z) = orbit(angle);
        let eye = Point3::new(x, terrain.height(x, z) + opt.altitude, z);
        let (ax, az) = orbit(angle + 0.3);
        camera.set_position(eye);
        camera.look_at(&Point3::new(ax, terrain.height(ax, az), az), &Vector3::y());

        let start = Instant::now();
        terrain.calculate(&camera);
        terrain_time += start.elapsed();

        for prop in &props {
            prop.step(&terrain, extent);
        }

        let start = Instant::now();
        culler.refresh_stale_objects();
        let view = RenderView::from_camera(&camera);
        let mut visible = 0;
        let mut listener =
            |_: &Rc<dyn VisibilityObject>, _: Option<MeshHandle>, _: u32| visible += 1;
        if opt.occlusion {
            let mut queries = HorizonQueries::new(&terrain, eye);
            culler.vis_test_occlusion(&view, Some(&mut listener), &mut queries);
        } else {
            culler.vis_test(&view, Some(&mut listener));
        }
        cull_time += start.elapsed();

        debug!(
            "frame {}: {} triangles, {} vertices, {} objects visible",
            frame,
            terrain.triangles().len(),
            terrain.vertices().len(),
            visible
        );
        visible_total += visible;
    }

    terrain.verify()?;
    culler.kdtree().verify()?;

    let frames = opt.frames as f64;
    println!("frames:          {}", opt.frames);
    println!("leaf triangles:  {}", terrain.triangle_count());
    println!("terrain stats:   {}", terrain.stats());
    println!(
        "terrain time:    {:.3}ms/frame",
        terrain_time.as_secs_f64() * 1000.0 / frames
    );
    println!("objects:         {}", culler.object_count());
    println!("visible/frame:   {:.1}", visible_total as f64 / frames);
    println!("culler stats:    {}", culler.stats());
    println!("kd-tree nodes:   {}", culler.kdtree().node_count());
    println!(
        "cull time:       {:.3}ms/frame",
        cull_time.as_secs_f64() * 1000.0 / frames
    );

    let target = props
        .first()
        .map(|prop| prop.position())
        .unwrap_or(center);
    let eye = *camera.position();
    if let Some(hit) = culler.intersect_segment(&eye, &target, true) {
        println!(
            "first object toward {:?}: {} at {:.1}",
            target,
            hit.mesh.map(|m| m.to_string()).unwrap_or_default(),
            (hit.point - eye).norm()
        );
    }
    Ok(())
}
