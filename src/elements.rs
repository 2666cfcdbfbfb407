//! The shared interleaved per-vertex buffer written by animation states.

mod range;
mod tracking;

pub use range::{ParticleDescriptor, ParticleRange, ParticleRangeTable};
pub use tracking::{BufferChange, BufferChangeTracker};

use crate::node::ParticleNodeID;
use anyhow::Result;
use std::{mem, ops::Range};

/// The floats a per-particle node owns within every vertex record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexColumn {
    offset: usize,
    length: usize,
}

/// Assignment of vertex columns to the per-particle nodes of a compiled
/// animation set.
///
/// Columns are laid out back to back in node order, so they are disjoint and
/// their lengths sum to the stride.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexLayout {
    columns: Vec<(ParticleNodeID, VertexColumn)>,
    stride: usize,
}

/// Receiver of the vertex buffer contents, such as a GPU buffer manager.
pub trait VertexBufferUploader {
    /// Uploads the given bytes, holding `stride` floats per vertex. If
    /// `change` is [`BufferChange::Layout`] the size of the buffer differs
    /// from the previous upload.
    fn upload_vertex_data(&mut self, bytes: &[u8], stride: usize, change: BufferChange)
    -> Result<()>;
}

/// Owner of the flat vertex buffer shared by all per-particle animation
/// states of one particle system.
///
/// The buffer holds `stride` floats for every vertex in the range table.
/// States write their per-particle values through
/// [`write_particle`](Self::write_particle), which only touches the column
/// of the writing node, and the change tracker records whether the buffer
/// must be uploaded again.
#[derive(Clone, Debug)]
pub struct AnimationElements {
    vertex_data: Vec<f32>,
    stride: usize,
    range_table: ParticleRangeTable,
    previous_time: Option<f32>,
    change_tracker: BufferChangeTracker,
}

impl VertexColumn {
    pub(crate) const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// Offset of the column's first float within a vertex record.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Number of floats in the column.
    pub const fn length(&self) -> usize {
        self.length
    }

    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }
}

impl VertexLayout {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a column of the given length for the given node and returns
    /// it.
    pub(crate) fn push_column(&mut self, node: ParticleNodeID, length: usize) -> VertexColumn {
        let column = VertexColumn::new(self.stride, length);
        self.columns.push((node, column));
        self.stride += length;
        column
    }

    /// Number of floats in each vertex record.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn column(&self, node: ParticleNodeID) -> Option<VertexColumn> {
        self.columns
            .iter()
            .find(|(column_node, _)| *column_node == node)
            .map(|(_, column)| *column)
    }

    pub fn columns(&self) -> &[(ParticleNodeID, VertexColumn)] {
        &self.columns
    }
}

impl AnimationElements {
    /// Creates a zeroed buffer holding `stride` floats for every vertex in
    /// the given range table.
    pub fn new(stride: usize, range_table: ParticleRangeTable) -> Self {
        Self {
            vertex_data: vec![0.0; stride * range_table.n_vertices()],
            stride,
            range_table,
            previous_time: None,
            change_tracker: BufferChangeTracker::new(),
        }
    }

    /// Creates a zeroed buffer with the stride of the given layout.
    pub fn for_layout(layout: &VertexLayout, range_table: ParticleRangeTable) -> Self {
        Self::new(layout.stride(), range_table)
    }

    /// Recreates the buffer for a new set of particles. All values are reset
    /// to zero, the next tick is treated as the first one and the next upload
    /// reports a layout change.
    pub fn rebuild(&mut self, range_table: ParticleRangeTable) {
        log::debug!(
            "Rebuilding animation elements for {} particles ({} vertices)",
            range_table.n_particles(),
            range_table.n_vertices()
        );
        self.vertex_data = vec![0.0; self.stride * range_table.n_vertices()];
        self.range_table = range_table;
        self.previous_time = None;
        self.change_tracker.notify_layout_change();
    }

    pub fn vertex_data(&self) -> &[f32] {
        &self.vertex_data
    }

    /// Returns the vertex data as raw bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertex_data)
    }

    /// Number of floats in each vertex record.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn range_table(&self) -> &ParticleRangeTable {
        &self.range_table
    }

    pub fn n_vertices(&self) -> usize {
        self.range_table.n_vertices()
    }

    /// The clock time of the last completed tick, if any.
    pub fn previous_time(&self) -> Option<f32> {
        self.previous_time
    }

    /// Returns the time elapsed since the last completed tick. Before the
    /// first tick the elapsed time is unknown and `None` is returned.
    pub fn delta_time(&self, current_time: f32) -> Option<f32> {
        self.previous_time
            .map(|previous_time| current_time - previous_time)
    }

    /// Records the given time as the time of the last completed tick.
    pub fn advance_time(&mut self, current_time: f32) {
        self.previous_time = Some(current_time);
    }

    pub fn change(&self) -> BufferChange {
        self.change_tracker.change()
    }

    /// Whether the buffer changed since it was last uploaded.
    pub fn is_dirty(&self) -> bool {
        self.change_tracker.is_dirty()
    }

    /// Marks the buffer as needing upload. Calling this repeatedly has the
    /// same effect as calling it once.
    pub fn invalidate_buffer(&mut self) {
        self.change_tracker.notify_content_change();
    }

    /// Clears the dirty state without uploading.
    pub fn mark_uploaded(&mut self) {
        self.change_tracker.reset();
    }

    /// Returns the values in the given column of the first vertex of the
    /// given particle.
    ///
    /// # Panics
    /// If the particle does not exist or the column lies outside the vertex
    /// record.
    pub fn particle_values(&self, column: VertexColumn, particle_index: usize) -> &[f32] {
        let range = self.particle_range(particle_index);
        let start = range.start_vertex * self.stride + column.offset();
        &self.vertex_data[start..start + column.length()]
    }

    /// Writes the given values into the column of every vertex of the given
    /// particle, unless every vertex already holds exactly these values.
    /// Returns whether anything was written, in which case the buffer is
    /// invalidated.
    ///
    /// # Panics
    /// - If the number of values differs from the column length.
    /// - If the column lies outside the vertex record.
    /// - If the particle does not exist.
    pub fn write_particle(
        &mut self,
        column: VertexColumn,
        particle_index: usize,
        values: &[f32],
    ) -> bool {
        assert_eq!(
            values.len(),
            column.length(),
            "Tried to write {} values into a vertex column of length {}",
            values.len(),
            column.length()
        );
        assert!(
            column.range().end <= self.stride,
            "Vertex column {:?} exceeds stride {}",
            column.range(),
            self.stride
        );

        let vertices = self.particle_range(particle_index).vertex_range();
        let stride = self.stride;

        let is_unchanged = vertices.clone().all(|vertex| {
            let start = vertex * stride + column.offset();
            self.vertex_data[start..start + column.length()] == *values
        });
        if is_unchanged {
            return false;
        }

        for vertex in vertices {
            let start = vertex * stride + column.offset();
            self.vertex_data[start..start + column.length()].copy_from_slice(values);
        }
        self.invalidate_buffer();
        true
    }

    /// Uploads the buffer through the given uploader if it changed since the
    /// last upload, and returns the change that was uploaded.
    ///
    /// # Errors
    /// Returns an error if the uploader fails, in which case the buffer
    /// remains dirty.
    pub fn upload_if_dirty(
        &mut self,
        uploader: &mut impl VertexBufferUploader,
    ) -> Result<BufferChange> {
        let change = self.change_tracker.change();
        if change == BufferChange::None {
            return Ok(change);
        }
        log::trace!(
            "Uploading {} bytes of particle vertex data ({:?})",
            mem::size_of_val(self.vertex_data.as_slice()),
            change
        );
        uploader.upload_vertex_data(self.vertex_bytes(), self.stride, change)?;
        Ok(self.change_tracker.take_change())
    }

    fn particle_range(&self, particle_index: usize) -> &ParticleRange {
        self.range_table
            .get(particle_index)
            .unwrap_or_else(|| panic!("Particle {} is not in the range table", particle_index))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_quads() -> ParticleRangeTable {
        ParticleRangeTable::from_vertex_counts([
            ParticleDescriptor {
                n_vertices: 4,
                start_time: 0.0,
                total_time: 1.0,
            },
            ParticleDescriptor {
                n_vertices: 4,
                start_time: 0.25,
                total_time: 1.0,
            },
        ])
        .unwrap()
    }

    #[derive(Default)]
    struct RecordingUploader {
        uploads: Vec<(usize, usize, BufferChange)>,
    }

    impl VertexBufferUploader for RecordingUploader {
        fn upload_vertex_data(
            &mut self,
            bytes: &[u8],
            stride: usize,
            change: BufferChange,
        ) -> Result<()> {
            self.uploads.push((bytes.len(), stride, change));
            Ok(())
        }
    }

    #[test]
    fn layout_columns_are_disjoint_and_sum_to_stride() {
        let mut layout = VertexLayout::new();
        let time = layout.push_column(ParticleNodeID::from_name("time"), 2);
        let follow = layout.push_column(ParticleNodeID::from_name("follow"), 3);
        assert_eq!(time.range(), 0..2);
        assert_eq!(follow.range(), 2..5);
        assert_eq!(layout.stride(), 5);
        assert_eq!(
            layout.column(ParticleNodeID::from_name("follow")),
            Some(follow)
        );
        assert!(layout.column(ParticleNodeID::from_name("uv")).is_none());
    }

    #[test]
    fn new_elements_are_zeroed_and_clean() {
        let elements = AnimationElements::new(5, two_quads());
        assert_eq!(elements.vertex_data().len(), 40);
        assert!(elements.vertex_data().iter().all(|&value| value == 0.0));
        assert!(!elements.is_dirty());
        assert!(elements.delta_time(1.0).is_none());
    }

    #[test]
    fn writing_particle_fills_all_its_vertices_and_leaves_others_untouched() {
        let mut elements = AnimationElements::new(5, two_quads());
        let column = VertexColumn::new(2, 3);
        let before = elements.vertex_data()[20..].to_vec();

        assert!(elements.write_particle(column, 0, &[1.0, 2.0, 3.0]));

        for vertex in 0..4 {
            let start = vertex * 5;
            assert_eq!(elements.vertex_data()[start..start + 2], [0.0, 0.0]);
            assert_eq!(elements.vertex_data()[start + 2..start + 5], [1.0, 2.0, 3.0]);
        }
        assert_eq!(elements.vertex_data()[20..], before[..]);
        assert!(elements.is_dirty());
    }

    #[test]
    fn writing_unchanged_values_is_a_no_op() {
        let mut elements = AnimationElements::new(3, two_quads());
        let column = VertexColumn::new(0, 3);
        assert!(!elements.write_particle(column, 1, &[0.0, 0.0, 0.0]));
        assert!(!elements.is_dirty());

        elements.write_particle(column, 1, &[4.0, 5.0, 6.0]);
        elements.mark_uploaded();
        assert!(!elements.write_particle(column, 1, &[4.0, 5.0, 6.0]));
        assert!(!elements.is_dirty());
    }

    #[test]
    #[should_panic]
    fn writing_wrong_number_of_values_panics() {
        let mut elements = AnimationElements::new(3, two_quads());
        elements.write_particle(VertexColumn::new(0, 3), 0, &[1.0, 2.0]);
    }

    #[test]
    fn invalidation_is_idempotent() {
        let mut elements = AnimationElements::new(3, two_quads());
        elements.invalidate_buffer();
        elements.invalidate_buffer();
        assert_eq!(elements.change(), BufferChange::Contents);
    }

    #[test]
    fn upload_only_happens_when_dirty() {
        let mut elements = AnimationElements::new(3, two_quads());
        let mut uploader = RecordingUploader::default();

        assert_eq!(
            elements.upload_if_dirty(&mut uploader).unwrap(),
            BufferChange::None
        );
        assert!(uploader.uploads.is_empty());

        elements.write_particle(VertexColumn::new(0, 3), 0, &[1.0, 1.0, 1.0]);
        assert_eq!(
            elements.upload_if_dirty(&mut uploader).unwrap(),
            BufferChange::Contents
        );
        assert_eq!(uploader.uploads, [(96, 3, BufferChange::Contents)]);
        assert!(!elements.is_dirty());
    }

    #[test]
    fn rebuilding_resizes_and_reports_layout_change() {
        let mut elements = AnimationElements::new(3, two_quads());
        elements.write_particle(VertexColumn::new(0, 3), 0, &[1.0, 1.0, 1.0]);

        let single = ParticleRangeTable::from_vertex_counts([ParticleDescriptor {
            n_vertices: 6,
            start_time: 0.0,
            total_time: 2.0,
        }])
        .unwrap();
        elements.advance_time(1.0);
        elements.rebuild(single);

        assert_eq!(elements.vertex_data().len(), 18);
        assert_eq!(elements.previous_time(), None);
        assert!(elements.vertex_data().iter().all(|&value| value == 0.0));
        assert_eq!(elements.change(), BufferChange::Layout);
    }

    #[test]
    fn delta_time_is_measured_from_last_advance() {
        let mut elements = AnimationElements::new(3, two_quads());
        elements.advance_time(1.5);
        assert_eq!(elements.previous_time(), Some(1.5));
        assert_eq!(elements.delta_time(2.0), Some(0.5));
        assert_eq!(elements.delta_time(1.5), Some(0.0));
    }
}
