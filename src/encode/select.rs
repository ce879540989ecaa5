use std::{io::Write, mem};

use crate::{
    errors::EbError,
    format::{Command, LiteralBytes, Opcode, MAX_COUNT},
};

use super::{
    search::{Candidate, Source},
    SearchBackend,
};

/// How many input bytes a command covers per byte it costs in the stream
#[derive(Debug, Clone, Copy)]
struct Ratio {
    length: usize,
    cost: usize,
}

impl Ratio {
    /// A literal byte costs (about) one byte
    const LITERAL: Self = Self { length: 1, cost: 1 };

    fn of(cand: &Candidate) -> Self {
        Self {
            length: cand.length,
            cost: cand.op.encoded_len(count_for(cand.op, cand.length)),
        }
    }

    fn beats(&self, other: &Self) -> bool {
        self.length * other.cost > other.length * self.cost
    }
}

/// ConstantWord counts words; everything else counts bytes
fn count_for(op: Opcode, length: usize) -> usize {
    match op {
        Opcode::ConstantWord => length / 2,
        _ => length,
    }
}

/// The commands chosen for an input, in stream order
#[derive(Debug)]
pub(super) struct CommandPass {
    pub commands: Vec<Command>,
    pub decompressed_size: usize,
}

impl CommandPass {
    /// Size of the packed stream, terminator included
    pub(super) fn compressed_size(&self) -> usize {
        self.commands.iter().map(Command::encoded_len).sum::<usize>() + 1
    }
}

/// Consecutive bytes that no strategy wanted, waiting to become one Literal
#[derive(Debug, Default)]
struct LiteralQueue {
    bytes: LiteralBytes,
}

impl LiteralQueue {
    fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    fn is_full(&self) -> bool {
        self.bytes.len() >= MAX_COUNT
    }

    fn take(&mut self) -> Option<Command> {
        if self.bytes.is_empty() {
            None
        } else {
            Some(Command::Literal(mem::take(&mut self.bytes)))
        }
    }
}

/// Choose a command for every position of `data`.
/// Each chosen command is written to `log` if present.
pub(super) fn compress(
    data: &[u8],
    backend: SearchBackend,
    log: &mut Option<&mut dyn Write>,
) -> Result<CommandPass, EbError> {
    let src = Source::new(data, backend);
    let mut commands = Vec::new();
    let mut queue = LiteralQueue::default();
    // input position of the first queued literal, for logging
    let mut queued_at = 0;
    let mut pos = 0;

    while pos < src.len() {
        match best_candidate(&src.candidates(pos)) {
            None => {
                queue.push(src.byte(pos));
                pos += 1;
                if queue.is_full() {
                    if let Some(lit) = queue.take() {
                        emit(&mut commands, lit, queued_at, log)?;
                    }
                    queued_at = pos;
                }
            }
            Some(cand) => {
                if let Some(lit) = queue.take() {
                    emit(&mut commands, lit, queued_at, log)?;
                }
                emit(&mut commands, into_command(cand), pos, log)?;
                pos += cand.length;
                queued_at = pos;
            }
        }
    }

    if let Some(lit) = queue.take() {
        emit(&mut commands, lit, queued_at, log)?;
    }

    Ok(CommandPass {
        commands,
        decompressed_size: data.len(),
    })
}

fn emit(
    commands: &mut Vec<Command>,
    cmd: Command,
    at: usize,
    log: &mut Option<&mut dyn Write>,
) -> Result<(), EbError> {
    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "{:04x} - {}", at, &cmd)?;
    }
    commands.push(cmd);
    Ok(())
}

/// The candidate with the best ratio, if any beats a literal.
/// Earlier candidates win ties.
fn best_candidate(cands: &[Candidate]) -> Option<Candidate> {
    cands
        .iter()
        .fold((None, Ratio::LITERAL), |(best, best_ratio), cand| {
            let ratio = Ratio::of(cand);
            if ratio.beats(&best_ratio) {
                (Some(*cand), ratio)
            } else {
                (best, best_ratio)
            }
        })
        .0
}

fn into_command(cand: Candidate) -> Command {
    let Candidate {
        op,
        length,
        argument,
    } = cand;
    let count = count_for(op, length);

    match op {
        Opcode::ConstantByte => Command::ConstantByte {
            count,
            value: argument as u8,
        },
        Opcode::ConstantWord => Command::ConstantWord {
            count,
            value: argument,
        },
        Opcode::IncrementingByte => Command::IncrementingByte {
            count,
            start: argument as u8,
        },
        Opcode::ForwardCopy => Command::ForwardCopy {
            count,
            index: argument,
        },
        Opcode::BitReversedCopy => Command::BitReversedCopy {
            count,
            index: argument,
        },
        Opcode::BackwardCopy => Command::BackwardCopy {
            count,
            index: argument,
        },
        Opcode::Literal => unreachable!("literals are never search candidates"),
    }
}
