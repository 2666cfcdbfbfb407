//! Mapping from particles to their vertex spans in the shared buffer.

use crate::error::AnimationError;
use std::ops::Range;

/// The contiguous span of vertices belonging to one particle, together with
/// the timing of the particle's life cycle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParticleRange {
    pub particle_index: usize,
    pub start_vertex: usize,
    pub n_vertices: usize,
    /// Time at which the particle's first cycle begins.
    pub start_time: f32,
    /// Duration of one cycle of the particle.
    pub total_time: f32,
}

/// Vertex count and timing of a particle, for laying out a
/// [`ParticleRangeTable`] from scratch.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParticleDescriptor {
    pub n_vertices: usize,
    pub start_time: f32,
    pub total_time: f32,
}

/// Immutable table of the vertex range of every particle in a particle
/// system. Ranges of distinct particles never overlap.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleRangeTable {
    ranges: Vec<ParticleRange>,
    n_vertices: usize,
}

impl ParticleRange {
    pub fn vertex_range(&self) -> Range<usize> {
        self.start_vertex..self.start_vertex + self.n_vertices
    }

    /// Returns how long ago, relative to `current_time`, the particle began
    /// its current cycle. The result lies in `[0, total_time)`.
    pub fn cycle_phase(&self, current_time: f32) -> f32 {
        (current_time - self.start_time).rem_euclid(self.total_time)
    }
}

impl ParticleRangeTable {
    /// Creates a table from the given ranges.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The particle indices are not exactly `0..ranges.len()`.
    /// - A particle has no vertices or a non-positive cycle duration.
    /// - The vertex ranges of two particles overlap.
    pub fn new(mut ranges: Vec<ParticleRange>) -> Result<Self, AnimationError> {
        ranges.sort_by_key(|range| range.particle_index);

        for (expected_index, range) in ranges.iter().enumerate() {
            if range.particle_index != expected_index {
                return Err(AnimationError::InvalidParticleRange {
                    particle: range.particle_index,
                    reason: "particle indices must run contiguously from zero",
                });
            }
            Self::validate_range(range)?;
        }

        let mut by_start_vertex: Vec<&ParticleRange> = ranges.iter().collect();
        by_start_vertex.sort_by_key(|range| range.start_vertex);

        for pair in by_start_vertex.windows(2) {
            if pair[0].vertex_range().end > pair[1].start_vertex {
                return Err(AnimationError::OverlappingParticleRanges {
                    first: pair[0].particle_index,
                    second: pair[1].particle_index,
                });
            }
        }

        let n_vertices = ranges
            .iter()
            .map(|range| range.vertex_range().end)
            .max()
            .unwrap_or(0);

        Ok(Self { ranges, n_vertices })
    }

    /// Creates a table where the particles occupy consecutive vertex spans
    /// in the order they are given.
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn from_vertex_counts(
        descriptors: impl IntoIterator<Item = ParticleDescriptor>,
    ) -> Result<Self, AnimationError> {
        let mut start_vertex = 0;
        let ranges = descriptors
            .into_iter()
            .enumerate()
            .map(|(particle_index, descriptor)| {
                let range = ParticleRange {
                    particle_index,
                    start_vertex,
                    n_vertices: descriptor.n_vertices,
                    start_time: descriptor.start_time,
                    total_time: descriptor.total_time,
                };
                start_vertex += descriptor.n_vertices;
                range
            })
            .collect();
        Self::new(ranges)
    }

    /// Returns the ranges ordered by particle index.
    pub fn ranges(&self) -> &[ParticleRange] {
        &self.ranges
    }

    pub fn get(&self, particle_index: usize) -> Option<&ParticleRange> {
        self.ranges.get(particle_index)
    }

    pub fn n_particles(&self) -> usize {
        self.ranges.len()
    }

    /// Returns the number of vertices needed to hold every particle.
    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    fn validate_range(range: &ParticleRange) -> Result<(), AnimationError> {
        if range.n_vertices == 0 {
            return Err(AnimationError::InvalidParticleRange {
                particle: range.particle_index,
                reason: "particle has no vertices",
            });
        }
        if !(range.total_time.is_finite() && range.total_time > 0.0) {
            return Err(AnimationError::InvalidParticleRange {
                particle: range.particle_index,
                reason: "cycle duration must be positive and finite",
            });
        }
        if !range.start_time.is_finite() {
            return Err(AnimationError::InvalidParticleRange {
                particle: range.particle_index,
                reason: "start time must be finite",
            });
        }
        Ok(())
    }
}
