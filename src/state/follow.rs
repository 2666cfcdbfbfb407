//! Runtime state for follow nodes.

use crate::{
    animator::TransformSource,
    error::AnimationError,
    node::{FollowNode, FollowPolicy, FollowProperty, FollowTargetID, PreviousSampleTracking},
    state::{StateBinding, TickContext},
};
use nalgebra::Vector3;

/// Samples the follow target every tick and hands the sample to the
/// particles that began a cycle since the previous tick.
#[derive(Clone, Debug, PartialEq)]
pub struct FollowState {
    target: FollowTargetID,
    property: FollowProperty,
    policy: FollowPolicy,
    tracking: PreviousSampleTracking,
    current_sample: Option<Vector3<f32>>,
    previous_sample: Option<Vector3<f32>>,
}

impl FollowState {
    pub fn new(node: &FollowNode) -> Self {
        Self {
            target: node.target(),
            property: node.property(),
            policy: node.policy(),
            tracking: node.tracking(),
            current_sample: None,
            previous_sample: None,
        }
    }

    pub fn target(&self) -> FollowTargetID {
        self.target
    }

    pub fn policy(&self) -> FollowPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: FollowPolicy) {
        self.policy = policy;
    }

    pub fn tracking(&self) -> PreviousSampleTracking {
        self.tracking
    }

    pub fn set_tracking(&mut self, tracking: PreviousSampleTracking) {
        self.tracking = tracking;
    }

    /// The most recent sample of the target, if it was ever available.
    pub fn current_sample(&self) -> Option<Vector3<f32>> {
        self.current_sample
    }

    pub fn previous_sample(&self) -> Option<Vector3<f32>> {
        self.previous_sample
    }

    /// Returns the rate of change of the sampled value over the last tick,
    /// pointing from the current towards the previous sample, so that
    /// adding it times a particle's phase steps back in time.
    pub fn velocity(&self, delta_time: Option<f32>) -> Vector3<f32> {
        match (self.policy, delta_time, self.current_sample, self.previous_sample) {
            (FollowPolicy::Smoothed, Some(delta_time), Some(current), Some(previous))
                if delta_time > 0.0 =>
            {
                (previous - current) / delta_time
            }
            _ => Vector3::zeros(),
        }
    }

    pub(super) fn tick(
        &mut self,
        binding: &StateBinding,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), AnimationError> {
        if let Some(sample) = self.sample(ctx.transforms) {
            self.current_sample = Some(sample);
        }
        let Some(current) = self.current_sample else {
            return Ok(());
        };

        if !ctx.writes_vertex_data() {
            return Ok(());
        }

        let column = binding.column()?;
        let velocity = self.velocity(ctx.delta_time);

        let mut n_written = 0;
        for particle_index in 0..ctx.elements.range_table().n_particles() {
            let range = ctx.elements.range_table().ranges()[particle_index];
            if let Some(phase) = ctx.cycle_start_within_tick(&range) {
                let value = current + velocity * phase;
                if ctx
                    .elements
                    .write_particle(column, particle_index, value.as_slice())
                {
                    n_written += 1;
                }
            }
        }
        log::trace!("Follow state wrote {} particles", n_written);

        match self.tracking {
            PreviousSampleTracking::PerTick => {
                self.previous_sample = Some(current);
            }
            PreviousSampleTracking::Frozen => {
                self.previous_sample.get_or_insert(current);
            }
        }
        Ok(())
    }

    fn sample(&self, transforms: &dyn TransformSource) -> Option<Vector3<f32>> {
        match self.property {
            FollowProperty::Position => transforms
                .target_position(self.target)
                .map(|position| position.coords),
            FollowProperty::Rotation => transforms.target_rotation(self.target),
        }
    }
}
