use super::diagnostics::Diagnostics;
use super::lower::{convert_row, JmpToOrder};
use super::opcode::Op;
use crate::module::{Module, Row, NUM_CHANNELS};
use std::collections::HashMap;

fn order_label(order: u16) -> String {
    format!("order_{order}")
}

/// A per-`(pattern_id, channel)` block lowered once in compact mode, addressed by `call`.
pub struct Block {
    pub label: String,
    pub ops: Vec<Op>,
}

/// The raw (pre-optimisation) lowering of a module: the main stream plus, in compact mode, the
/// distinct per-channel pattern blocks it calls into.
pub struct RawStream {
    pub main: Vec<Op>,
    pub blocks: Vec<Block>,
}

fn block_label(channel: u8, pattern_id: u8, len: usize) -> String {
    format!("pat_{channel:02x}_{pattern_id:02x}_{len:02x}")
}

fn row_at<'a>(module: &'a Module, pattern_id: u8, channel: u8, row_index: u16) -> Option<&'a Row> {
    module.pattern(pattern_id, channel).and_then(|p| p.rows.get(row_index as usize))
}

enum NextStep {
    Order(u16),
    Stop,
}

/// Lowers every row of one order, across all 14 channels, into the row's flattened op sequence
/// (as a vector of per-channel row contributions — needed separately in compact mode so each
/// channel's pattern can be isolated into its own block) and the row's resulting control signal.
fn lower_order_row(
    module: &Module,
    order: u16,
    pattern_ids: &[u8; NUM_CHANNELS],
    row_index: u16,
    diagnostics: &mut Diagnostics,
) -> (Vec<Vec<Op>>, Option<JmpToOrder>) {
    let mut per_channel = Vec::with_capacity(NUM_CHANNELS);
    let mut signal = None;
    for channel in 0..NUM_CHANNELS as u8 {
        let pattern_id = pattern_ids[channel as usize];
        let empty_row;
        let row = match row_at(module, pattern_id, channel, row_index) {
            Some(r) => r,
            None => {
                empty_row = Row::empty(module.fx_columns[channel as usize] as usize);
                &empty_row
            }
        };
        if row.is_empty() {
            per_channel.push(Vec::new());
            continue;
        }
        let actions = convert_row(row, channel, order, row_index, diagnostics);
        if signal.is_none() {
            signal = actions.jmp_to_order;
        }
        let flow_fx = actions.flow_fx.clone();
        let mut ops = flow_fx;
        ops.extend(actions.flatten());
        per_channel.push(ops);
    }
    (per_channel, signal)
}

/// Lowers the full module into a flat main stream (non-compact mode): every order visited in
/// play sequence, each row's 14 channels flattened in channel order, terminated by `wait_n(1)`.
pub fn build_inline(module: &Module, diagnostics: &mut Diagnostics) -> RawStream {
    let mut main = vec![Op::Label("_start".to_string())];
    if module.orders.is_empty() {
        main.push(Op::End);
        return RawStream { main, blocks: Vec::new() };
    }

    let mut seen_orders: Vec<u16> = Vec::new();
    let mut current = 0u16;
    loop {
        if seen_orders.contains(&current) {
            main.push(Op::Jmp(order_label(current)));
            break;
        }
        seen_orders.push(current);
        main.push(Op::Label(order_label(current)));

        let pattern_ids = module.orders[current as usize];
        let mut next = NextStep::Order(current + 1);
        for row_index in 0..module.pattern_len {
            let (per_channel, signal) =
                lower_order_row(module, current, &pattern_ids, row_index, diagnostics);
            if per_channel.iter().any(|c| !c.is_empty()) {
                main.push(Op::Loc { order: current, channel: 0, row: row_index });
            }
            for ops in per_channel {
                main.extend(ops);
            }
            main.push(Op::WaitN(1));
            if let Some(sig) = signal {
                next = match sig {
                    JmpToOrder::Order(n) => NextStep::Order(n as u16),
                    JmpToOrder::Next => NextStep::Order(current + 1),
                    JmpToOrder::Stop => NextStep::Stop,
                };
                break;
            }
        }

        match next {
            NextStep::Stop => {
                main.push(Op::End);
                break;
            }
            NextStep::Order(n) if (n as usize) < module.orders.len() => current = n,
            NextStep::Order(_) => {
                main.push(Op::End);
                break;
            }
        }
    }

    RawStream { main, blocks: Vec::new() }
}

/// Lowers the module in compact mode: each distinct `(channel, pattern_id, realised length)`
/// instance becomes a labelled block lowered exactly once; the main stream calls into blocks
/// instead of inlining their rows.
pub fn build_compact(module: &Module, diagnostics: &mut Diagnostics) -> RawStream {
    let mut main = vec![Op::Label("_start".to_string())];
    let mut blocks: Vec<Block> = Vec::new();
    let mut block_index: HashMap<(u8, u8), usize> = HashMap::new();

    if module.orders.is_empty() {
        main.push(Op::End);
        return RawStream { main, blocks };
    }

    let mut seen_orders: Vec<u16> = Vec::new();
    let mut current = 0u16;
    loop {
        if seen_orders.contains(&current) {
            main.push(Op::Jmp(order_label(current)));
            break;
        }
        seen_orders.push(current);
        main.push(Op::Label(order_label(current)));

        let pattern_ids = module.orders[current as usize];
        let mut order_jmp: Option<JmpToOrder> = None;
        for (channel, &pattern_id) in pattern_ids.iter().enumerate() {
            let channel = channel as u8;
            let key = (channel, pattern_id);
            let idx = *block_index.entry(key).or_insert_with(|| {
                let (ops, signal) = lower_block_rows(module, current, channel, pattern_id, diagnostics);
                if order_jmp.is_none() {
                    order_jmp = signal;
                }
                let label = block_label(channel, pattern_id, module.pattern_len as usize);
                blocks.push(Block { label, ops });
                blocks.len() - 1
            });
            main.push(Op::Call(blocks[idx].label.clone()));
        }

        let next = match order_jmp {
            Some(JmpToOrder::Order(n)) => NextStep::Order(n as u16),
            Some(JmpToOrder::Next) | None => NextStep::Order(current + 1),
            Some(JmpToOrder::Stop) => NextStep::Stop,
        };
        match next {
            NextStep::Stop => {
                main.push(Op::End);
                break;
            }
            NextStep::Order(n) if (n as usize) < module.orders.len() => current = n,
            NextStep::Order(_) => {
                main.push(Op::End);
                break;
            }
        }
    }

    RawStream { main, blocks }
}

fn lower_block_rows(
    module: &Module,
    order: u16,
    channel: u8,
    pattern_id: u8,
    diagnostics: &mut Diagnostics,
) -> (Vec<Op>, Option<JmpToOrder>) {
    let mut ops = Vec::new();
    let mut signal = None;
    for row_index in 0..module.pattern_len {
        let empty_row;
        let row = match row_at(module, pattern_id, channel, row_index) {
            Some(r) => r,
            None => {
                empty_row = Row::empty(module.fx_columns[channel as usize] as usize);
                &empty_row
            }
        };
        if !row.is_empty() {
            let actions = convert_row(row, channel, order, row_index, diagnostics);
            if signal.is_none() {
                signal = actions.jmp_to_order;
            }
            ops.push(Op::Loc { order, channel, row: row_index });
            ops.extend(actions.flow_fx.clone());
            ops.extend(actions.flatten());
        }
        ops.push(Op::WaitN(1));
    }
    ops.push(Op::Ret);
    (ops, signal)
}

/// Shared control-flow-aware walker used by several optimisation passes (compact-instr,
/// insert-missing-vol, compact-ctx, simulate-ssg-autoenv): visits the main stream in order,
/// descending into a `call`'s target block to update `visitor`'s shadow state every time the
/// call is encountered, but only emitting (via `visitor.emit`) a given block's contents on its
/// first visit. This keeps per-channel shadow state correct across call sites without
/// duplicating a block's output in the final stream.
pub trait ControlFlowVisitor {
    fn visit(&mut self, op: &Op) -> Option<Op>;
}

pub fn run_control_flow_pass<V: ControlFlowVisitor>(
    main: &[Op],
    blocks: &[Block],
    visitor: &mut V,
) -> (Vec<Op>, HashMap<String, Vec<Op>>) {
    let block_by_label: HashMap<&str, &Block> =
        blocks.iter().map(|b| (b.label.as_str(), b)).collect();
    let mut new_blocks: HashMap<String, Vec<Op>> = HashMap::new();

    let new_main = walk(&block_by_label, main, visitor, &mut new_blocks);
    (new_main, new_blocks)
}

/// Walks one level of the stream (the main stream, or a single block's body reached via
/// `call`), visiting every op and recursing into callees in place to keep shadow state current.
/// A block's output is recorded into `new_blocks` only the first time it's reached; later visits
/// still run `visitor` over every op (so shadow state stays accurate) but their rewritten output
/// is discarded, matching the source's "visit once, still walk every time" behaviour.
fn walk<V: ControlFlowVisitor>(
    block_by_label: &HashMap<&str, &Block>,
    ops: &[Op],
    visitor: &mut V,
    new_blocks: &mut HashMap<String, Vec<Op>>,
) -> Vec<Op> {
    let mut local_out = Vec::with_capacity(ops.len());
    for op in ops {
        if let Op::Call(label) = op {
            if let Some(block) = block_by_label.get(label.as_str()) {
                if !new_blocks.contains_key(label.as_str()) {
                    let rewritten = walk(block_by_label, &block.ops, visitor, new_blocks);
                    new_blocks.insert(label.clone(), rewritten);
                } else {
                    walk(block_by_label, &block.ops, visitor, new_blocks);
                }
            }
        }
        match visitor.visit(op) {
            Some(rewritten) => local_out.push(rewritten),
            None => local_out.push(op.clone()),
        }
    }
    local_out
}
