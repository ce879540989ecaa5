use rayon::prelude::*;

use crate::format::{Opcode, MAX_COPY_INDEX, MAX_COUNT};

use super::SearchBackend;

/// lookahead for commands that count bytes
const BYTE_WINDOW: usize = MAX_COUNT;
/// ConstantWord counts words, so it can cover twice as many bytes
const WORD_WINDOW: usize = MAX_COUNT * 2;

/// The best match one strategy found at a position.
///
/// `length` is always in bytes of input covered. `argument` is the repeated
/// byte or word, the starting byte, or the copy source index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Candidate {
    pub op: Opcode,
    pub length: usize,
    pub argument: u16,
}

impl Candidate {
    fn new(op: Opcode, length: usize, argument: u16) -> Self {
        Self {
            op,
            length,
            argument,
        }
    }
}

/// The input being compressed, plus a bit reversed copy of it for
/// `BitReversedCopy` searches
#[derive(Debug)]
pub(super) struct Source<'a> {
    data: &'a [u8],
    reversed: Vec<u8>,
    backend: SearchBackend,
}

impl<'a> Source<'a> {
    pub(super) fn new(data: &'a [u8], backend: SearchBackend) -> Self {
        let reversed = data.iter().map(|b| b.reverse_bits()).collect();
        Self {
            data,
            reversed,
            backend,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.data.len()
    }

    pub(super) fn byte(&self, pos: usize) -> u8 {
        self.data[pos]
    }

    /// Run every strategy at `pos`. The order of the returned candidates is the
    /// order ties are broken in.
    pub(super) fn candidates(&self, pos: usize) -> [Candidate; 6] {
        [
            self.constant_byte(pos),
            self.constant_word(pos),
            self.incrementing_byte(pos),
            self.forward_copy(pos),
            self.bit_reversed_copy(pos),
            self.backward_copy(pos),
        ]
    }

    fn ahead(&self, pos: usize, window: usize) -> usize {
        (self.data.len() - pos).min(window)
    }

    fn constant_byte(&self, pos: usize) -> Candidate {
        let data = self.data;
        let value = data[pos];
        let length = run_length(self.ahead(pos, BYTE_WINDOW), |k| data[pos + k] == value);

        Candidate::new(Opcode::ConstantByte, length, value as u16)
    }

    fn constant_word(&self, pos: usize) -> Candidate {
        // only whole words can be matched
        let limit = self.ahead(pos, WORD_WINDOW) & !1;
        if limit < 2 {
            return Candidate::new(Opcode::ConstantWord, 0, 0);
        }

        let word = |at: usize| u16::from_le_bytes([self.data[at], self.data[at + 1]]);
        let value = word(pos);
        let words = run_length(limit / 2, |k| word(pos + k * 2) == value);

        Candidate::new(Opcode::ConstantWord, words * 2, value)
    }

    fn incrementing_byte(&self, pos: usize) -> Candidate {
        let data = self.data;
        let start = data[pos];
        let length = run_length(self.ahead(pos, BYTE_WINDOW), |k| {
            data[pos + k] == start.wrapping_add(k as u8)
        });

        Candidate::new(Opcode::IncrementingByte, length, start as u16)
    }

    fn forward_copy(&self, pos: usize) -> Candidate {
        let data = self.data;
        let ahead = self.ahead(pos, BYTE_WINDOW);
        let (length, start) = self.longest_copy(pos, |_| ahead, |start, k| {
            data[start + k] == data[pos + k]
        });

        Candidate::new(Opcode::ForwardCopy, length, start as u16)
    }

    fn bit_reversed_copy(&self, pos: usize) -> Candidate {
        let (data, reversed) = (self.data, &self.reversed);
        let ahead = self.ahead(pos, BYTE_WINDOW);
        let (length, start) = self.longest_copy(pos, |_| ahead, |start, k| {
            reversed[start + k] == data[pos + k]
        });

        Candidate::new(Opcode::BitReversedCopy, length, start as u16)
    }

    fn backward_copy(&self, pos: usize) -> Candidate {
        let data = self.data;
        let ahead = self.ahead(pos, BYTE_WINDOW);
        // the source walks down to index 0 at most
        let (length, start) = self.longest_copy(pos, |start| ahead.min(start + 1), |start, k| {
            data[start - k] == data[pos + k]
        });

        Candidate::new(Opcode::BackwardCopy, length, start as u16)
    }

    /// Search every copy source before `pos` for the longest match.
    ///
    /// `reach` gives the most bytes that may be compared from a source index, and
    /// `matches(start, k)` compares the `k`th byte of that source with the `k`th byte
    /// at `pos`. The earliest source wins a tie.
    fn longest_copy<L, F>(&self, pos: usize, reach: L, matches: F) -> (usize, usize)
    where
        L: Fn(usize) -> usize + Sync,
        F: Fn(usize, usize) -> bool + Sync,
    {
        // sources have to be addressable by a 16-bit index
        let sources = pos.min(MAX_COPY_INDEX + 1);
        let length_at = |start: usize| run_length(reach(start), |k| matches(start, k));

        match self.backend {
            SearchBackend::Brute => {
                let longest = self.ahead(pos, BYTE_WINDOW);
                let mut best = (0, 0);
                for start in 0..sources {
                    let length = length_at(start);
                    if length > best.0 {
                        best = (length, start);
                        if length == longest {
                            break;
                        }
                    }
                }
                best
            }
            SearchBackend::Parallel => (0..sources)
                .into_par_iter()
                .map(|start| (length_at(start), start))
                .reduce(
                    || (0, 0),
                    |a, b| if b.0 > a.0 || (b.0 == a.0 && b.1 < a.1) { b } else { a },
                ),
        }
    }
}

/// Count how many leading positions in `0..limit` satisfy `matches`
fn run_length<F: Fn(usize) -> bool>(limit: usize, matches: F) -> usize {
    (0..limit).take_while(|&k| matches(k)).count()
}
