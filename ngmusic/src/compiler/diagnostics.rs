use crate::module::Row;

/// A single non-fatal finding produced while lowering a module.
#[derive(Debug, Clone)]
pub enum Warning {
    UnsupportedFx { location: Location, code: u8 },
    VolumeClamp { location: Location, requested: u8, clamped: u8 },
}

/// Where in the source module a warning originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub order: u16,
    pub channel: u8,
    pub row: u16,
}

/// Accumulates warnings raised while lowering a module, in emission order.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Renders every accumulated warning as a one-line message with its row highlighted, in the
    /// style of a compiler diagnostic. Intended to be flushed via `tracing::warn!` by callers.
    pub fn render(&self, row_lookup: impl Fn(Location) -> Option<Row>) -> Vec<String> {
        self.warnings
            .iter()
            .map(|w| match w {
                Warning::UnsupportedFx { location, code } => format!(
                    "unsupported effect {code:#04x} at {}\n{}",
                    fmt_location(*location),
                    fmt_location_context(*location, row_lookup(*location).as_ref())
                ),
                Warning::VolumeClamp { location, requested, clamped } => format!(
                    "volume {requested:#04x} clamped to {clamped:#04x} at {}\n{}",
                    fmt_location(*location),
                    fmt_location_context(*location, row_lookup(*location).as_ref())
                ),
            })
            .collect()
    }
}

fn fmt_location(loc: Location) -> String {
    format!("order {}, channel {}, row {}", loc.order, loc.channel, loc.row)
}

/// Renders a single row's contents with the offending field implicitly highlighted by simply
/// showing the full row; callers needing tighter highlighting can inspect `Warning` directly.
fn fmt_location_context(_loc: Location, row: Option<&Row>) -> String {
    match row {
        Some(row) => format!(
            "  note={:?} ins={:?} vol={:?} fx={:?}",
            row.note, row.instrument, row.volume, row.effects
        ),
        None => "  <row unavailable>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_formats_each_warning() {
        let mut diag = Diagnostics::new();
        diag.push(Warning::UnsupportedFx { location: Location { order: 0, channel: 1, row: 2 }, code: 0x7e });
        diag.push(Warning::VolumeClamp {
            location: Location { order: 0, channel: 1, row: 2 },
            requested: 0x1f,
            clamped: 0x0f,
        });
        let rendered = diag.render(|_| None);
        assert_eq!(rendered.len(), 2);
        assert!(rendered[0].contains("0x7e"));
        assert!(rendered[1].contains("0x1f"));
    }
}
