//! Runtime animation playback
//!
//! Clips are keyframe samplers plus channels binding sampler output to a
//! target (a node's local transform or one bone of a skeleton node). An
//! [`AnimationPlayer`] owns its clips in a local slot pool and advances
//! playback once per frame; evaluation produces a list of [`PoseEdit`]s the
//! scene applies after the player borrow ends.

use std::collections::HashMap;

use crate::foundation::math::{Quaternion, Transform, Unit, Vec3, Vec4};
use crate::pool::{Handle, SlotPool};

/// Keyframe interpolation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Linear blend between adjacent keyframes
    #[default]
    Linear,
    /// Hold the previous keyframe
    Step,
    /// Cubic Hermite spline over `[in-tangent, value, out-tangent]` triplets
    CubicSpline,
}

/// Keyframe times and values for one animated quantity
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    /// Keyframe times, strictly ascending
    pub times: Vec<f32>,
    /// One value per keyframe (three per keyframe for `CubicSpline`)
    pub values: Vec<Vec4>,
    /// Interpolation mode
    pub interpolation: Interpolation,
}

impl Sampler {
    /// Value at or before the first keyframe
    pub fn first_keyframe(&self) -> Vec4 {
        if self.values.is_empty() {
            return Vec4::zeros();
        }
        if self.interpolation == Interpolation::CubicSpline && self.values.len() >= 3 {
            self.values[1]
        } else {
            self.values[0]
        }
    }

    /// Value at or after the last keyframe
    pub fn last_keyframe(&self) -> Vec4 {
        if self.values.is_empty() {
            return Vec4::zeros();
        }
        if self.interpolation == Interpolation::CubicSpline && self.values.len() >= 3 {
            self.values[self.values.len() - 2]
        } else {
            self.values[self.values.len() - 1]
        }
    }

    /// Sample the curve at `time`, clamping outside the keyframe range
    pub fn evaluate(&self, time: f32) -> Vec4 {
        if self.times.is_empty() || self.values.is_empty() {
            return Vec4::zeros();
        }

        let t_min = self.times[0];
        let t_max = self.times[self.times.len() - 1];
        if time <= t_min {
            return self.first_keyframe();
        }
        if time >= t_max {
            return self.last_keyframe();
        }

        // Binary search for the keyframe interval
        let mut left = 0;
        let mut right = self.times.len() - 1;
        while left < right - 1 {
            let mid = left + (right - left) / 2;
            if time < self.times[mid] {
                right = mid;
            } else {
                left = mid;
            }
        }
        let index = left;

        let t0 = self.times[index];
        let t1 = self.times[index + 1];
        let dt = (t1 - t0).max(1e-6);
        let f = (time - t0) / dt;

        match self.interpolation {
            Interpolation::Linear => self.values[index].lerp(&self.values[index + 1], f),
            Interpolation::Step => self.values[index],
            Interpolation::CubicSpline => {
                let i0 = index * 3;
                let i1 = (index + 1) * 3;
                if i1 + 2 >= self.values.len() {
                    return self.values[i0 + 1];
                }

                let v0 = self.values[i0 + 1];
                let out0 = self.values[i0 + 2];
                let in1 = self.values[i1];
                let v1 = self.values[i1 + 1];

                let f2 = f * f;
                let f3 = f2 * f;

                let h00 = 2.0 * f3 - 3.0 * f2 + 1.0;
                let h10 = f3 - 2.0 * f2 + f;
                let h01 = -2.0 * f3 + 3.0 * f2;
                let h11 = f3 - f2;

                let m0 = out0 * dt;
                let m1 = in1 * dt;

                v0 * h00 + m0 * h10 + v1 * h01 + m1 * h11
            }
        }
    }
}

/// Which part of the target a channel drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPath {
    /// Target translation (xyz)
    Translation,
    /// Target rotation quaternion (xyzw)
    Rotation,
    /// Target scale (xyz)
    Scale,
}

/// What a channel writes to
///
/// Node handles here are scene-node references and get remapped when a
/// scene is merged into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTarget {
    /// A node's local transform
    Node(Handle),
    /// One bone of the skeleton carried by `skeleton_node`
    Bone {
        /// Node carrying the skeleton pose
        skeleton_node: Handle,
        /// Bone index within that rig
        bone_index: u32,
    },
}

/// Binds one sampler to one target path
#[derive(Debug, Clone)]
pub struct Channel {
    /// Index into the clip's sampler list
    pub sampler: usize,
    /// Driven quantity
    pub path: ChannelPath,
    /// Driven target
    pub target: ChannelTarget,
}

/// A named animation clip
#[derive(Debug, Clone, Default)]
pub struct Clip {
    /// Clip name, unique within a player
    pub name: String,
    /// Keyframe curves
    pub samplers: Vec<Sampler>,
    /// Sampler-to-target bindings
    pub channels: Vec<Channel>,
    /// Length in seconds, cached from the sampler end times
    pub duration: f32,
}

/// One evaluated transform write, applied by the scene after evaluation
#[derive(Debug, Clone)]
pub struct PoseEdit {
    /// Where the transform goes
    pub target: ChannelTarget,
    /// Sampled TRS for this frame
    pub transform: Transform,
}

/// Per-instance animation playback state
///
/// Lives in the scene's runtime registry, referenced by a node's animation
/// component.
#[derive(Debug, Clone)]
pub struct AnimationPlayer {
    clips: SlotPool<Clip>,
    names: HashMap<String, Handle>,
    current: Handle,
    playing: bool,
    looping: bool,
    time: f32,
    speed: f32,
}

impl Default for AnimationPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationPlayer {
    /// Create an empty player
    pub fn new() -> Self {
        Self {
            clips: SlotPool::new(),
            names: HashMap::new(),
            current: Handle::INVALID,
            playing: false,
            looping: true,
            time: 0.0,
            speed: 1.0,
        }
    }

    /// Add a clip, making its name unique with a numeric suffix if needed
    ///
    /// The duration is cached from the sampler end times. Clips without
    /// samplers or channels are rejected with an invalid handle.
    pub fn add_clip(&mut self, mut clip: Clip) -> Handle {
        if clip.samplers.is_empty() || clip.channels.is_empty() {
            return Handle::INVALID;
        }

        let base = if clip.name.is_empty() {
            "Clip".to_string()
        } else {
            clip.name.clone()
        };
        let mut unique = base.clone();
        let mut suffix = 1;
        while self.names.contains_key(&unique) {
            unique = format!("{base}_{suffix}");
            suffix += 1;
        }
        clip.name = unique.clone();

        clip.duration = clip
            .samplers
            .iter()
            .filter_map(|sampler| sampler.times.last().copied())
            .fold(0.0, f32::max);

        let handle = self.clips.insert(clip);
        self.names.insert(unique, handle);
        handle
    }

    /// Look up a clip by name
    pub fn clip(&self, name: &str) -> Option<&Clip> {
        self.clips.get(*self.names.get(name)?)
    }

    /// The clip selected for playback
    pub fn current_clip(&self) -> Option<&Clip> {
        self.clips.get(self.current)
    }

    /// Clip names known to this player
    pub fn clip_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Select a clip by name and restart playback from its beginning
    pub fn play(&mut self, name: &str) -> bool {
        match self.names.get(name) {
            Some(&handle) => {
                self.current = handle;
                self.time = 0.0;
                self.playing = true;
                true
            }
            None => {
                log::warn!("Animation clip not found: {name}");
                false
            }
        }
    }

    /// Pause playback, keeping the current time
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Resume paused playback
    pub fn resume(&mut self) {
        self.playing = self.clips.is_valid(self.current);
    }

    /// Stop playback and rewind to the clip start
    pub fn stop(&mut self) {
        self.time = 0.0;
        self.playing = false;
    }

    /// Whether playback is running
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current playback time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Playback speed multiplier
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// Loop at the clip end instead of stopping
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Advance playback and evaluate the current clip
    ///
    /// Returns one edit per animated target; the caller applies them to the
    /// scene. Non-looping playback clamps at the clip end and stops.
    pub fn advance(&mut self, delta_time: f32) -> Vec<PoseEdit> {
        if !self.playing {
            return Vec::new();
        }
        let Some(clip) = self.clips.get(self.current) else {
            return Vec::new();
        };

        self.time += delta_time * self.speed;
        if self.time > clip.duration {
            if self.looping && clip.duration > 0.0 {
                self.time %= clip.duration;
            } else {
                self.time = clip.duration;
                self.playing = false;
            }
        }
        let time = self.time;

        // Accumulate per-target TRS in first-encounter order
        let mut edits: Vec<PoseEdit> = Vec::new();
        for channel in &clip.channels {
            let Some(sampler) = clip.samplers.get(channel.sampler) else {
                continue;
            };
            let value = sampler.evaluate(time);

            let slot = match edits.iter().position(|edit| edit.target == channel.target) {
                Some(index) => index,
                None => {
                    edits.push(PoseEdit {
                        target: channel.target,
                        transform: Transform::identity(),
                    });
                    edits.len() - 1
                }
            };
            let edit = &mut edits[slot];

            match channel.path {
                ChannelPath::Translation => {
                    edit.transform.position = Vec3::new(value.x, value.y, value.z);
                }
                ChannelPath::Rotation => {
                    edit.transform.rotation = Unit::new_normalize(Quaternion::new(
                        value.w, value.x, value.y, value.z,
                    ));
                }
                ChannelPath::Scale => {
                    edit.transform.scale = Vec3::new(value.x, value.y, value.z);
                }
            }
        }

        edits
    }

    /// Rewrite every channel's node references through a merge map
    ///
    /// Targets not present in the map are invalidated rather than left
    /// pointing into the source scene.
    pub fn remap_node_targets(&mut self, map: &HashMap<u32, Handle>) {
        let remap = |handle: Handle| -> Handle {
            if !handle.is_valid() {
                return Handle::INVALID;
            }
            map.get(&handle.index).copied().unwrap_or(Handle::INVALID)
        };

        for (_, clip) in self.clips.iter_mut() {
            for channel in &mut clip.channels {
                channel.target = match channel.target {
                    ChannelTarget::Node(node) => ChannelTarget::Node(remap(node)),
                    ChannelTarget::Bone {
                        skeleton_node,
                        bone_index,
                    } => ChannelTarget::Bone {
                        skeleton_node: remap(skeleton_node),
                        bone_index,
                    },
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn translation_clip(target: Handle) -> Clip {
        Clip {
            name: "slide".to_string(),
            samplers: vec![Sampler {
                times: vec![0.0, 1.0],
                values: vec![Vec4::zeros(), Vec4::new(2.0, 0.0, 0.0, 0.0)],
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

    #[test]
    fn test_sampler_linear_interpolation() {
        let sampler = Sampler {
            times: vec![0.0, 2.0],
            values: vec![Vec4::zeros(), Vec4::new(4.0, 0.0, 0.0, 0.0)],
            interpolation: Interpolation::Linear,
        };

        assert_relative_eq!(sampler.evaluate(1.0).x, 2.0, epsilon = 1e-6);
        // Clamped outside the keyframe range
        assert_relative_eq!(sampler.evaluate(-1.0).x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(sampler.evaluate(5.0).x, 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sampler_step_holds_previous_keyframe() {
        let sampler = Sampler {
            times: vec![0.0, 1.0, 2.0],
            values: vec![
                Vec4::new(1.0, 0.0, 0.0, 0.0),
                Vec4::new(2.0, 0.0, 0.0, 0.0),
                Vec4::new(3.0, 0.0, 0.0, 0.0),
            ],
            interpolation: Interpolation::Step,
        };

        assert_relative_eq!(sampler.evaluate(0.5).x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(sampler.evaluate(1.5).x, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cubic_spline_passes_through_keyframes() {
        // Triplets: [in-tangent, value, out-tangent]
        let sampler = Sampler {
            times: vec![0.0, 1.0],
            values: vec![
                Vec4::zeros(),
                Vec4::new(0.0, 0.0, 0.0, 0.0),
                Vec4::zeros(),
                Vec4::zeros(),
                Vec4::new(3.0, 0.0, 0.0, 0.0),
                Vec4::zeros(),
            ],
            interpolation: Interpolation::CubicSpline,
        };

        assert_relative_eq!(sampler.evaluate(0.0).x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(sampler.evaluate(1.0).x, 3.0, epsilon = 1e-6);
        // Zero tangents give the smoothstep midpoint
        assert_relative_eq!(sampler.evaluate(0.5).x, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_add_clip_caches_duration_and_uniquifies_names() {
        let mut player = AnimationPlayer::new();
        let target = Handle::new(1, 0);

        let first = player.add_clip(translation_clip(target));
        let second = player.add_clip(translation_clip(target));

        assert!(player.clips.is_valid(first));
        assert!(player.clips.is_valid(second));
        assert_relative_eq!(player.clip("slide").unwrap().duration, 1.0);
        assert!(player.clip("slide_1").is_some());
    }

    #[test]
    fn test_add_clip_rejects_empty() {
        let mut player = AnimationPlayer::new();
        assert_eq!(player.add_clip(Clip::default()), Handle::INVALID);
    }

    #[test]
    fn test_playback_advance_and_loop() {
        let mut player = AnimationPlayer::new();
        let target = Handle::new(1, 0);
        player.add_clip(translation_clip(target));
        assert!(player.play("slide"));

        let edits = player.advance(0.5);
        assert_eq!(edits.len(), 1);
        assert_relative_eq!(edits[0].transform.position.x, 1.0, epsilon = 1e-6);

        // Looping wraps the time
        player.advance(1.0);
        assert!(player.is_playing());
        assert!(player.time() < 1.0);
    }

    #[test]
    fn test_non_looping_playback_stops_at_end() {
        let mut player = AnimationPlayer::new();
        player.add_clip(translation_clip(Handle::new(1, 0)));
        player.set_looping(false);
        assert!(player.play("slide"));

        let edits = player.advance(2.0);
        assert_relative_eq!(edits[0].transform.position.x, 2.0, epsilon = 1e-6);
        assert!(!player.is_playing());
        assert_relative_eq!(player.time(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_remap_node_targets_invalidates_unmapped() {
        let mut player = AnimationPlayer::new();
        player.add_clip(translation_clip(Handle::new(3, 0)));

        let mut map = HashMap::new();
        map.insert(3, Handle::new(9, 0));
        player.remap_node_targets(&map);
        let clip = player.clip("slide").unwrap();
        assert_eq!(clip.channels[0].target, ChannelTarget::Node(Handle::new(9, 0)));

        // A target outside the map must not survive as a stale reference
        player.remap_node_targets(&HashMap::new());
        let clip = player.clip("slide").unwrap();
        assert_eq!(clip.channels[0].target, ChannelTarget::Node(Handle::INVALID));
    }
}
