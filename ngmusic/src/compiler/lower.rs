use super::diagnostics::{Diagnostics, Location, Warning};
use super::opcode::Op;
use crate::module::{ChannelFamily, Effect, Row, NOTE_OFF};

/// Lowered result of one channel's row: operations plus an optional order-jump signal.
#[derive(Debug, Clone, Default)]
pub struct RowActions {
    pub jmp_to_order: Option<JmpToOrder>,
    pub flow_fx: Vec<Op>,
    pub ctx: Option<Op>,
    pub pre_fx: Vec<Op>,
    pub ins: Vec<Op>,
    pub vol: Vec<Op>,
    pub fx: Vec<Op>,
    pub note: Vec<Op>,
    pub post_fx: Vec<Op>,
}

impl RowActions {
    /// Flattens every segment in the fixed `ctx, pre_fx, ins, vol, fx, note, post_fx` order.
    /// `flow_fx` and `location` are handled separately by the caller since they are
    /// channel-agnostic and only emitted once per row.
    pub fn flatten(self) -> Vec<Op> {
        let mut out = Vec::new();
        out.extend(self.ctx);
        out.extend(self.pre_fx);
        out.extend(self.ins);
        out.extend(self.vol);
        out.extend(self.fx);
        out.extend(self.note);
        out.extend(self.post_fx);
        out
    }
}

/// What an effect's `jmp`-like signal means for the order-graph walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JmpToOrder {
    Order(u8),
    Next,
    Stop,
}

/// Converts a Furnace semitone (0..179, or [`NOTE_OFF`]) to the driver's signed note operand
/// (semitone minus C-4's index, 60).
fn to_nss_note(note: u8) -> i8 {
    (note as i32 - 60) as i8
}

/// Produces the `ctx_*` opcode selecting a channel's subchannel slot.
fn ctx_op(channel: u8) -> Op {
    let slot = ChannelFamily::slot(channel);
    match ChannelFamily::of(channel) {
        ChannelFamily::Fm => Op::CtxFm(slot),
        ChannelFamily::Ssg => Op::CtxSsg(slot),
        ChannelFamily::AdpcmA => Op::CtxAdpcmA(slot),
        ChannelFamily::AdpcmB => Op::CtxAdpcmB,
    }
}

/// Lowers one channel's row into a [`RowActions`] record, following the effect table and
/// per-family note/volume semantics.
pub fn convert_row(
    row: &Row,
    channel: u8,
    order: u16,
    row_index: u16,
    diagnostics: &mut Diagnostics,
) -> RowActions {
    let family = ChannelFamily::of(channel);
    let mut actions = RowActions { ctx: Some(ctx_op(channel)), ..Default::default() };
    let location = Location { order, channel, row: row_index };

    if let Some(ins) = row.instrument {
        actions.ins.push(Op::Instr(ins));
    }

    if let Some(vol) = row.volume {
        let max = family.max_volume();
        let clamped = vol.min(max);
        if clamped != vol {
            diagnostics.push(Warning::VolumeClamp { location, requested: vol, clamped });
        }
        actions.vol.push(Op::Vol(clamped));
    }

    for effect in &row.effects {
        lower_effect(effect, &mut actions, location, diagnostics);
    }

    if let Some(note) = row.note {
        if note == NOTE_OFF {
            actions.note.push(Op::NoteOff);
        } else {
            actions.note.push(Op::Note(to_nss_note(note)));
        }
    }

    actions
}

fn lower_effect(
    effect: &Effect,
    actions: &mut RowActions,
    location: Location,
    diagnostics: &mut Diagnostics,
) {
    let (code, value) = match (effect.code, effect.value) {
        (Some(c), v) => (c, v.unwrap_or(0)),
        (None, _) => return,
    };

    match code {
        0x00 => {
            if value == 0 {
                actions.pre_fx.push(Op::ArpeggioOff);
            } else {
                actions.fx.push(Op::ArpeggioOn(value >> 4, value & 0xf));
            }
        }
        0x01 => {
            if value == 0 {
                actions.pre_fx.push(Op::PitchSlideOff);
            } else {
                actions.fx.push(Op::PitchSlideUp(value));
            }
        }
        0x02 => {
            if value == 0 {
                actions.pre_fx.push(Op::PitchSlideOff);
            } else {
                actions.fx.push(Op::PitchSlideDown(value));
            }
        }
        0x03 => actions.fx.push(Op::Portamento(value)),
        0x04 => {
            if value == 0 {
                actions.pre_fx.push(Op::VibratoOff);
            } else {
                actions.fx.push(Op::Vibrato(value >> 4, value & 0xf));
            }
        }
        0x08 => {
            let left = if value & 0xf0 != 0 { 0x80 } else { 0 };
            let right = if value & 0x0f != 0 { 0x40 } else { 0 };
            actions.fx.push(Op::Pan(left | right));
        }
        // Legacy two-value panning: 0x00/0x80 select the left channel, 0x80/0xff the right.
        0x80 => {
            let left = if value == 0x00 || value == 0x80 { 0x80 } else { 0 };
            let right = if value == 0x80 || value == 0xff { 0x40 } else { 0 };
            actions.fx.push(Op::Pan(left | right));
        }
        0x09 => actions.flow_fx.push(Op::Groove(value)),
        0x0a => {
            if value == 0 {
                actions.pre_fx.push(Op::VolSlideOff);
            } else {
                let up = (value >> 4) as i8;
                let down = (value & 0xf) as i8;
                actions.fx.push(Op::VolSlide(up - down));
            }
        }
        0x0b => actions.jmp_to_order = Some(JmpToOrder::Order(value)),
        0x0c => {
            if value == 0 {
                actions.pre_fx.push(Op::RetriggerOff);
            } else {
                actions.fx.push(Op::Retrigger(value));
            }
        }
        0x0d => actions.jmp_to_order = Some(JmpToOrder::Next),
        0x0f => actions.flow_fx.push(Op::Speed(value)),
        0x12..=0x15 => actions.fx.push(Op::FmOpLevel(code - 0x12, value)),
        0xe0 => actions.flow_fx.push(Op::ArpeggioSpeed(value)),
        0xe1 => {
            if value == 0 {
                actions.pre_fx.push(Op::NoteSlideOff);
            } else {
                actions.post_fx.push(Op::NoteSlideUp(value));
            }
        }
        0xe2 => {
            if value == 0 {
                actions.pre_fx.push(Op::NoteSlideOff);
            } else {
                actions.post_fx.push(Op::NoteSlideDown(value));
            }
        }
        0xe5 => actions.fx.push(Op::PitchOffset(value as i8)),
        0xe6 => {
            if (8..=15).contains(&value) {
                actions.fx.push(Op::QuickLegatoDown(value - 8));
            } else {
                actions.fx.push(Op::QuickLegatoUp(value));
            }
        }
        0xe8 => actions.fx.push(Op::QuickLegatoUp(value)),
        0xe9 => actions.fx.push(Op::QuickLegatoDown(value)),
        0xea => {
            if value == 0 {
                actions.pre_fx.push(Op::LegatoOff);
            } else {
                actions.post_fx.push(Op::Legato(value as i8));
            }
        }
        0xec => actions.fx.push(Op::NoteCut(value)),
        0xed => actions.pre_fx.push(Op::NoteDelay(value)),
        0xff => actions.jmp_to_order = Some(JmpToOrder::Stop),
        other => diagnostics.push(Warning::UnsupportedFx { location, code: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Effect;

    fn row_with(note: Option<u8>, ins: Option<u8>, vol: Option<u8>, fx: Vec<Effect>) -> Row {
        Row { note, instrument: ins, volume: vol, effects: fx }
    }

    #[test]
    fn test_single_note_fm1_matches_expected_opcode_order() {
        let mut diag = Diagnostics::new();
        let row = row_with(Some(48), Some(0), Some(0x7f), vec![]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        let ops = actions.flatten();
        assert_eq!(
            ops,
            vec![Op::CtxFm(1), Op::Instr(0), Op::Vol(0x7f), Op::Note(-12)]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn test_ssg_volume_clamp_warns() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, Some(0x1f), vec![]);
        let actions = convert_row(&row, 4, 0, 0, &mut diag);
        assert_eq!(actions.vol, vec![Op::Vol(0x0f)]);
        assert!(matches!(diag.warnings()[0], Warning::VolumeClamp { clamped: 0x0f, requested: 0x1f, .. }));
    }

    #[test]
    fn test_unsupported_fx_is_warned_not_fatal() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, None, vec![Effect { code: Some(0x7e), value: Some(1) }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert!(actions.fx.is_empty());
        assert!(matches!(diag.warnings()[0], Warning::UnsupportedFx { code: 0x7e, .. }));
    }

    #[test]
    fn test_note_off() {
        let mut diag = Diagnostics::new();
        let row = row_with(Some(NOTE_OFF), None, None, vec![]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.note, vec![Op::NoteOff]);
    }

    #[test]
    fn test_panning_is_a_two_bit_mask_not_scaled_by_nibble_value() {
        let mut diag = Diagnostics::new();
        // Both nibbles set to 2 (not 1): must still collapse to the same L|R bit mask, never
        // overflow a byte.
        let row = row_with(None, None, None, vec![Effect { code: Some(0x08), value: Some(0x22) }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.fx, vec![Op::Pan(0x80 | 0x40)]);
    }

    #[test]
    fn test_panning_left_only() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, None, vec![Effect { code: Some(0x08), value: Some(0xf0) }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.fx, vec![Op::Pan(0x80)]);
    }

    #[test]
    fn test_legacy_panning_right() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, None, vec![Effect { code: Some(0x80), value: Some(0xff) }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.fx, vec![Op::Pan(0x40)]);
    }

    #[test]
    fn test_vibrato_zero_emits_off_in_pre_fx() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, None, vec![Effect { code: Some(0x04), value: Some(0) }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.pre_fx, vec![Op::VibratoOff]);
        assert!(actions.fx.is_empty());
    }

    #[test]
    fn test_vol_slide_zero_emits_off() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, None, vec![Effect { code: Some(0x0a), value: None }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.pre_fx, vec![Op::VolSlideOff]);
    }

    #[test]
    fn test_note_slide_up_goes_to_post_fx() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, None, vec![Effect { code: Some(0xe1), value: Some(4) }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.post_fx, vec![Op::NoteSlideUp(4)]);
    }

    #[test]
    fn test_note_cut_carries_delay_operand() {
        let mut diag = Diagnostics::new();
        let row = row_with(None, None, None, vec![Effect { code: Some(0xec), value: Some(3) }]);
        let actions = convert_row(&row, 0, 0, 0, &mut diag);
        assert_eq!(actions.fx, vec![Op::NoteCut(3)]);
    }
}
