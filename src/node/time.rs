//! Local time of each particle.

use crate::{
    codegen::{CodeFragment, CodeTemplate},
    node::{NodeCompileContext, ParticleNodeID},
    register::{RegisterKind, RegisterSlot},
};
use anyhow::Result;
use lazy_static::lazy_static;

/// Computes the time each vertex's particle has been alive, from the clock
/// and the particle's start time and cycle duration. Every animation set has
/// exactly one time node, compiled before all other nodes.
///
/// Particles whose start time lies in the future are collapsed. When
/// particles do not loop, so are particles whose cycle has ended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeNode;

lazy_static! {
    static ref LOCAL_TIME: CodeTemplate<'static> = CodeTemplate::new(
        "
        sub {{time}}.x, {{clock}}.x, {{stream}}.x
        sge {{scratch}}.x, {{time}}.x, {{common}}.x
        mul {{position}}.xyz, {{position}}.xyz, {{scratch}}.x
        "
    );
    static ref WRAP_TO_CYCLE: CodeTemplate<'static> = CodeTemplate::new(
        "
        div {{scratch}}.x, {{time}}.x, {{stream}}.y
        frc {{scratch}}.x, {{scratch}}.x
        mul {{time}}.x, {{scratch}}.x, {{stream}}.y
        "
    );
    static ref HIDE_EXPIRED: CodeTemplate<'static> = CodeTemplate::new(
        "
        slt {{scratch}}.x, {{time}}.x, {{stream}}.y
        mul {{position}}.xyz, {{position}}.xyz, {{scratch}}.x
        "
    );
    static ref LIFE_FRACTION: CodeTemplate<'static> = CodeTemplate::new(
        "
        div {{time}}.y, {{time}}.x, {{stream}}.y
        "
    );
}

impl TimeNode {
    pub const ID: ParticleNodeID = ParticleNodeID::literal("time");

    /// Constant register holding the clock time in `x`.
    pub const CLOCK: RegisterSlot = RegisterSlot("clock");

    /// The start time and cycle duration of the particle.
    pub const DATA_LENGTH: usize = 2;

    pub fn new() -> Self {
        Self
    }

    pub(super) fn emit_vertex_code(&self, ctx: &mut NodeCompileContext<'_>) -> Result<CodeFragment> {
        let clock = ctx.allocate_slot(RegisterKind::Constant, Self::CLOCK)?;
        let stream = ctx.allocate_stream()?;
        let scratch = ctx.allocate_scratch()?;

        let shared = *ctx.shared();
        let time = shared.vertex_time.to_string();
        let stream = stream.to_string();
        let scratch = scratch.to_string();
        let position = shared.position_target.to_string();

        let mut fragment = LOCAL_TIME.resolve_fragment([
            ("time", time.clone()),
            ("clock", clock.to_string()),
            ("stream", stream.clone()),
            ("scratch", scratch.clone()),
            ("common", shared.common_constants.to_string()),
            ("position", position.clone()),
        ])?;

        if ctx.looping() {
            fragment.append(&WRAP_TO_CYCLE.resolve_fragment([
                ("time", time.clone()),
                ("stream", stream.clone()),
                ("scratch", scratch),
            ])?);
        } else {
            fragment.append(&HIDE_EXPIRED.resolve_fragment([
                ("time", time.clone()),
                ("stream", stream.clone()),
                ("scratch", scratch),
                ("position", position),
            ])?);
        }

        fragment.append(&LIFE_FRACTION.resolve_fragment([("time", time), ("stream", stream)])?);

        Ok(fragment)
    }
}
