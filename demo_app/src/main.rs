//! Scene core demo application
//!
//! Headless walkthrough of the engine core: builds an animated, scripted
//! scene with a skinned rig, merges a second scene into it, runs a few
//! frames and drives the deferred-deletion queue the way a render loop
//! would after its fence waits.

use scene_engine::prelude::*;

/// Spins its node around the Y axis
struct Spinner {
    angle: f32,
    speed: f32,
}

impl NodeScript for Spinner {
    fn update(&mut self, scene: &mut Scene, node: Handle, delta_time: f32) {
        self.angle += self.speed * delta_time;
        if let Some(transform) = scene.get_component_mut::<Transform3D>(node) {
            transform.set(Mat4::from_axis_angle(&Vec3::y_axis(), self.angle));
        }
    }

    fn clone_boxed(&self) -> Option<Box<dyn NodeScript>> {
        Some(Box::new(Spinner {
            angle: self.angle,
            speed: self.speed,
        }))
    }
}

fn two_bone_rig() -> SkeletonRig {
    SkeletonRig {
        bones: vec![
            Bone {
                name: "root".to_string(),
                parent: None,
                local_bind: Mat4::identity(),
                inverse_bind: Mat4::identity(),
            },
            Bone {
                name: "tip".to_string(),
                parent: Some(0),
                local_bind: Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)),
                inverse_bind: Mat4::new_translation(&Vec3::new(0.0, -1.0, 0.0)),
            },
        ],
    }
}

fn wave_clip(target: Handle) -> Clip {
    Clip {
        name: "wave".to_string(),
        samplers: vec![Sampler {
            times: vec![0.0, 0.5, 1.0],
            values: vec![
                Vec4::new(0.0, 0.0, 0.0, 0.0),
                Vec4::new(0.0, 0.5, 0.0, 0.0),
                Vec4::new(0.0, 0.0, 0.0, 0.0),
            ],
            interpolation: Interpolation::Linear,
        }],
        channels: vec![Channel {
            sampler: 0,
            path: ChannelPath::Translation,
            target: ChannelTarget::Node(target),
        }],
        duration: 0.0,
    }
}

fn build_prop_scene() -> Scene {
    let mut scene = Scene::new("prop");
    let root = scene.add_root("PropRoot");
    let body = scene.add_node("Body", root);
    scene.add_node("Antenna", body);

    if let Some(instance) = scene.write_component::<ScriptBinding>(body) {
        instance.set_behavior(Box::new(Spinner {
            angle: 0.0,
            speed: 2.0,
        }));
        instance.set_var("home", ScriptValue::NodeRef(root));
    }

    scene
}

fn main() {
    env_logger::init();

    log::info!("Building main scene...");
    let mut scene = Scene::new("demo");
    let root = scene.add_root("Root");

    // A skinned character: skeleton node plus a mesh that references it
    let character = scene.add_node("Character", root);
    let skeleton = scene.add_node("Skeleton", character);
    let mesh = scene.add_node("Mesh", character);

    scene
        .write_component::<SkeletonBinding>(skeleton)
        .expect("skeleton node is live")
        .set_rig(two_bone_rig());
    if let Some(renderer) = scene.write_component::<MeshRenderer>(mesh) {
        renderer.mesh = Handle::new(0, 0); // External asset reference
        renderer.skeleton_node = skeleton;
    }

    // Animate the character node with a little bounce
    let player = scene
        .write_component::<AnimationBinding>(character)
        .expect("character node is live");
    player.add_clip(wave_clip(character));
    player.play("wave");

    log::info!("Merging prop scene...");
    let prop = build_prop_scene();
    scene.add_scene(&prop, root);
    log::info!("Scene now has {} nodes", scene.node_count());

    // Run a few frames, alternating the frame-in-flight slice
    for frame in 0..8u64 {
        let frame_index = (frame % 2) as usize;
        scene.update(1.0 / 60.0, frame_index);
    }

    let bounce = scene
        .get_component::<Transform3D>(character)
        .map(|transform| transform.global.m24)
        .unwrap_or_default();
    log::info!("Character height after 8 frames: {bounce:.3}");

    // Tear the character down; the pose buffer free is deferred
    scene.remove_node(character, true);
    log::info!(
        "Pending GPU-hazard removals: {}",
        scene.pending_removal_count::<SkeletonPose>()
    );

    // A real render loop flushes only after its frame-completion fences
    let freed = scene.flush_removals::<SkeletonPose>();
    log::info!("Flushed {freed} deferred removals");
    log::info!("Done: {} nodes remain", scene.node_count());
}
