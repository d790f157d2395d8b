/// A single bytecode record. Variants with no operand bytes besides their id (e.g. `NoteOff`)
/// still cost one byte in the output stream; [`Label`] and [`Loc`] cost zero — they are metadata
/// consumed entirely at compile time, never reaching the final stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Metadata: a jump/call target. Zero-width; resolved away by `resolve`.
    Label(String),
    /// Metadata: source location for diagnostics, stripped after the check passes.
    Loc { order: u16, channel: u8, row: u16 },

    Tempo(u8),
    Speed(u8),
    Groove(u8),

    CtxFm(u8),
    CtxSsg(u8),
    CtxAdpcmA(u8),
    CtxAdpcmB,

    Instr(u8),
    SMacro(u8),

    Vol(u8),
    Pan(u8),

    Note(i8),
    NoteOff,
    NoteCut(u8),
    NoteDelay(u8),
    Retrigger(u8),
    RetriggerOff,

    ArpeggioOn(u8, u8),
    ArpeggioOff,
    ArpeggioSpeed(u8),

    PitchSlideUp(u8),
    PitchSlideDown(u8),
    PitchSlideOff,
    Portamento(u8),
    PortamentoOff,
    Vibrato(u8, u8),
    VibratoOff,
    VolSlide(i8),
    VolSlideOff,
    PitchOffset(i8),
    NoteSlideUp(u8),
    NoteSlideDown(u8),
    NoteSlideOff,
    QuickLegatoUp(u8),
    QuickLegatoDown(u8),
    Legato(i8),
    LegatoOff,

    FmOpLevel(u8, u8),

    SEnv(u8, u8),

    WaitN(u8),
    WaitLast,

    /// Fused `note-on` + `wait_last`, per family.
    FmNoteW(i8),
    SNoteW(i8),
    AStartW(i8),
    FmStopW,

    Jmp(String),
    Call(String),
    Ret,
    CallTbl(u8),
    CallEntry(String),
    /// Call-table prologue record (compact mode only).
    PatOffset(String),

    Stop,
    End,
}

impl Op {
    /// The non-zero opcode byte written before this record's operands, or `None` for metadata
    /// and for records whose opcode is encoded as part of a fused field (none currently).
    pub fn id(&self) -> Option<u8> {
        match self {
            Op::Label(_) | Op::Loc { .. } => None,
            Op::Tempo(_) => Some(0x01),
            Op::Speed(_) => Some(0x02),
            Op::Groove(_) => Some(0x03),
            Op::CtxFm(_) => Some(0x04),
            Op::CtxSsg(_) => Some(0x05),
            Op::CtxAdpcmA(_) => Some(0x06),
            Op::CtxAdpcmB => Some(0x07),
            Op::Instr(_) => Some(0x08),
            Op::SMacro(_) => Some(0x09),
            Op::Vol(_) => Some(0x0a),
            Op::Pan(_) => Some(0x0b),
            Op::Note(_) => Some(0x20),
            Op::NoteOff => Some(0x21),
            Op::NoteCut(_) => Some(0x22),
            Op::NoteDelay(_) => Some(0x23),
            Op::Retrigger(_) => Some(0x24),
            Op::RetriggerOff => Some(0x25),
            Op::ArpeggioOn(..) => Some(0x26),
            Op::ArpeggioOff => Some(0x27),
            Op::ArpeggioSpeed(_) => Some(0x28),
            Op::PitchSlideUp(_) => Some(0x29),
            Op::PitchSlideDown(_) => Some(0x2a),
            Op::PitchSlideOff => Some(0x2b),
            Op::Portamento(_) => Some(0x2c),
            Op::PortamentoOff => Some(0x2d),
            Op::Vibrato(..) => Some(0x2e),
            Op::VibratoOff => Some(0x2f),
            Op::VolSlide(_) => Some(0x30),
            Op::VolSlideOff => Some(0x31),
            Op::PitchOffset(_) => Some(0x32),
            Op::NoteSlideUp(_) => Some(0x33),
            Op::NoteSlideDown(_) => Some(0x34),
            Op::NoteSlideOff => Some(0x47),
            Op::QuickLegatoUp(_) => Some(0x35),
            Op::QuickLegatoDown(_) => Some(0x36),
            Op::Legato(_) => Some(0x37),
            Op::LegatoOff => Some(0x48),
            Op::FmOpLevel(..) => Some(0x38),
            Op::SEnv(..) => Some(0x39),
            Op::WaitN(_) => Some(0x3a),
            Op::WaitLast => Some(0x3b),
            Op::FmNoteW(_) => Some(0x3c),
            Op::SNoteW(_) => Some(0x3d),
            Op::AStartW(_) => Some(0x3e),
            Op::FmStopW => Some(0x3f),
            Op::Jmp(_) => Some(0x40),
            Op::Call(_) => Some(0x41),
            Op::Ret => Some(0x42),
            Op::CallTbl(_) => Some(0x43),
            Op::CallEntry(_) => Some(0x44),
            // A raw 16-bit pointer in the call-table prologue; it has no opcode tag of its own,
            // only the two offset bytes `resolve`/the emitter compute for it.
            Op::PatOffset(_) => None,
            Op::Stop => Some(0x45),
            Op::End => Some(0x46),
        }
    }

    /// Number of operand bytes this record carries, not counting the opcode id itself. `Jmp` and
    /// `Call` operands are two bytes (a resolved `lsb`/`msb` pair); before resolution their width
    /// is still 2, since the label is only a placeholder for those two bytes.
    pub fn operand_len(&self) -> usize {
        match self {
            Op::Label(_) | Op::Loc { .. } => 0,
            Op::Tempo(_)
            | Op::Speed(_)
            | Op::Groove(_)
            | Op::CtxFm(_)
            | Op::CtxSsg(_)
            | Op::CtxAdpcmA(_)
            | Op::Instr(_)
            | Op::SMacro(_)
            | Op::Vol(_)
            | Op::Pan(_)
            | Op::Note(_)
            | Op::NoteDelay(_)
            | Op::NoteCut(_)
            | Op::Retrigger(_)
            | Op::ArpeggioSpeed(_)
            | Op::PitchSlideUp(_)
            | Op::PitchSlideDown(_)
            | Op::Portamento(_)
            | Op::VolSlide(_)
            | Op::PitchOffset(_)
            | Op::NoteSlideUp(_)
            | Op::NoteSlideDown(_)
            | Op::QuickLegatoUp(_)
            | Op::QuickLegatoDown(_)
            | Op::Legato(_)
            | Op::WaitN(_)
            | Op::FmNoteW(_)
            | Op::SNoteW(_)
            | Op::AStartW(_)
            | Op::CallTbl(_) => 1,
            Op::ArpeggioOn(..) | Op::Vibrato(..) | Op::FmOpLevel(..) | Op::SEnv(..) => 2,
            Op::CtxAdpcmB
            | Op::NoteOff
            | Op::RetriggerOff
            | Op::ArpeggioOff
            | Op::PitchSlideOff
            | Op::PortamentoOff
            | Op::VibratoOff
            | Op::VolSlideOff
            | Op::NoteSlideOff
            | Op::LegatoOff
            | Op::WaitLast
            | Op::FmStopW
            | Op::Ret
            | Op::Stop
            | Op::End => 0,
            Op::Jmp(_) | Op::Call(_) | Op::CallEntry(_) | Op::PatOffset(_) => 2,
        }
    }

    /// Total byte width of this record in the resolved stream: `0` for metadata, `operand_len()`
    /// for the untagged `pat_offset` pointer, else `1 + operand_len()`.
    pub fn size_in_bytes(&self) -> usize {
        if self.is_metadata() {
            return 0;
        }
        match self.id() {
            None => self.operand_len(),
            Some(_) => 1 + self.operand_len(),
        }
    }

    /// Whether this record is a metadata record with no on-wire representation.
    pub fn is_metadata(&self) -> bool {
        matches!(self, Op::Label(_) | Op::Loc { .. })
    }

    /// A short mnemonic for the emitted listing's comment column.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Label(_) => "label",
            Op::Loc { .. } => "loc",
            Op::Tempo(_) => "tempo",
            Op::Speed(_) => "speed",
            Op::Groove(_) => "groove",
            Op::CtxFm(_) => "fm_ctx",
            Op::CtxSsg(_) => "s_ctx",
            Op::CtxAdpcmA(_) => "a_ctx",
            Op::CtxAdpcmB => "b_ctx",
            Op::Instr(_) => "instr",
            Op::SMacro(_) => "s_macro",
            Op::Vol(_) => "vol",
            Op::Pan(_) => "pan",
            Op::Note(_) => "note",
            Op::NoteOff => "note_off",
            Op::NoteCut(_) => "note_cut",
            Op::NoteDelay(_) => "note_delay",
            Op::Retrigger(_) => "retrigger",
            Op::RetriggerOff => "retrigger_off",
            Op::ArpeggioOn(..) => "arp",
            Op::ArpeggioOff => "arp_off",
            Op::ArpeggioSpeed(_) => "arp_speed",
            Op::PitchSlideUp(_) => "pitch_up",
            Op::PitchSlideDown(_) => "pitch_down",
            Op::PitchSlideOff => "pitch_off",
            Op::Portamento(_) => "porta",
            Op::PortamentoOff => "porta_off",
            Op::Vibrato(..) => "vibrato",
            Op::VibratoOff => "vibrato_off",
            Op::VolSlide(_) => "vol_slide",
            Op::VolSlideOff => "vol_slide_off",
            Op::PitchOffset(_) => "pitch_offset",
            Op::NoteSlideUp(_) => "note_slide_up",
            Op::NoteSlideDown(_) => "note_slide_down",
            Op::NoteSlideOff => "note_slide_off",
            Op::QuickLegatoUp(_) => "legato_up",
            Op::QuickLegatoDown(_) => "legato_down",
            Op::Legato(_) => "legato",
            Op::LegatoOff => "legato_off",
            Op::FmOpLevel(..) => "fm_op_level",
            Op::SEnv(..) => "s_env",
            Op::WaitN(_) => "wait_n",
            Op::WaitLast => "wait_last",
            Op::FmNoteW(_) => "fm_note_w",
            Op::SNoteW(_) => "s_note_w",
            Op::AStartW(_) => "a_start_w",
            Op::FmStopW => "fm_stop_w",
            Op::Jmp(_) => "jmp",
            Op::Call(_) => "call",
            Op::Ret => "ret",
            Op::CallTbl(_) => "call_tbl",
            Op::CallEntry(_) => "call_entry",
            Op::PatOffset(_) => "pat_offset",
            Op::Stop => "stop",
            Op::End => "nss_end",
        }
    }
}
