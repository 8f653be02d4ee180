//! The instruction tape: program bytes, the instruction pointer, and the
//! while-index stack.

use crate::error::MachineError;
use crate::memory::Memory;
use crate::op;

/// Outcome of executing one op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The op ran and the tape has more to execute.
    Continue,
    /// The op ran and the tape end was reached; a clean halt.
    Halt,
}

#[derive(Debug, Clone, Default)]
pub struct Tape {
    program: Vec<u8>,
    ip: usize,
    while_stack: Vec<usize>,
}

impl Tape {
    pub fn new(program: &[u8]) -> Self {
        Self {
            program: program.to_vec(),
            ip: 0,
            while_stack: Vec::with_capacity(10),
        }
    }

    /// Replace the program and rewind.
    pub fn load(&mut self, program: &[u8]) {
        self.program.clear();
        self.program.extend_from_slice(program);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.ip = 0;
        self.while_stack.clear();
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    /// Execute the op under the instruction pointer against `memory`.
    ///
    /// Ops that do not explicitly set the pointer share the trailing
    /// auto-advance; running off the end there is the clean halt.
    pub fn step(&mut self, memory: &mut Memory) -> Result<Step, MachineError> {
        let ip = self.ip;
        let op_byte = match self.program.get(ip) {
            Some(&b) => b,
            None => {
                return Err(MachineError::TapeOutOfBounds {
                    ip,
                    len: self.program.len(),
                })
            }
        };

        match op_byte {
            op::INC => {
                if !memory.increment() {
                    return Err(MachineError::CellOverflow {
                        ip,
                        pointer: memory.pointer(),
                    });
                }
            }
            op::DEC => {
                if !memory.decrement() {
                    return Err(MachineError::CellUnderflow {
                        ip,
                        pointer: memory.pointer(),
                    });
                }
            }
            op::POINTER_LEFT => {
                if !memory.move_left() {
                    return Err(MachineError::PointerUnderflow { ip });
                }
            }
            op::POINTER_RIGHT => {
                if !memory.move_right() {
                    return Err(MachineError::PointerOverflow {
                        ip,
                        pointer: memory.pointer(),
                    });
                }
            }
            op::WHILE => {
                if memory.current() != 0 {
                    self.while_stack.push(ip);
                } else {
                    self.skip_to_loop_end()?;
                }
            }
            op::WHILE_END => {
                if memory.current() != 0 {
                    // Fall back to the loop start; the `[` re-pushes when
                    // it executes again, so this is a net peek.
                    let start = self
                        .while_stack
                        .pop()
                        .ok_or(MachineError::UnbalancedLoopEnd { ip })?;
                    self.ip = start;
                    return Ok(Step::Continue);
                }
                // Zero cell: leave the loop scope.
                if self.while_stack.pop().is_none() {
                    return Err(MachineError::UnbalancedLoopEnd { ip });
                }
            }
            op::JUMP => {
                if !memory.bookmark_jump() {
                    return Err(MachineError::BookmarkOutOfBounds {
                        ip,
                        bookmark: memory.bookmark(),
                        cells: memory.len(),
                    });
                }
            }
            op::BOOKMARK => memory.store_bookmark(),
            op::NO_OP => {}
            unknown => panic!("unknown op byte [{unknown:#04x}] at instruction [{ip}]"),
        }

        if self.ip + 1 < self.program.len() {
            self.ip += 1;
            Ok(Step::Continue)
        } else {
            Ok(Step::Halt)
        }
    }

    /// Scan forward from a zero-cell `[` to the first `]`.
    ///
    /// First, not brace-matched. Evolved programs have adapted to this
    /// scan; changing it changes what the whole population means.
    fn skip_to_loop_end(&mut self) -> Result<(), MachineError> {
        let ip = self.ip;
        if ip + 1 >= self.program.len() {
            return Err(MachineError::MissingLoopEnd { ip });
        }
        match self.program[ip..]
            .iter()
            .position(|&b| b == op::WHILE_END)
        {
            Some(offset) => {
                self.ip = ip + offset;
                Ok(())
            }
            None => Err(MachineError::MissingLoopEnd { ip }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tape_and_memory(program: &str) -> (Tape, Memory) {
        (Tape::new(program.as_bytes()), Memory::new(10))
    }

    #[test]
    fn zero_cell_while_skips_to_first_loop_end() {
        let (mut tape, mut memory) = tape_and_memory("[+]]");
        assert_eq!(tape.step(&mut memory).unwrap(), Step::Continue);
        // Landed on the `]` at index 2, auto-advanced to 3.
        assert_eq!(tape.ip(), 3);
        assert_eq!(memory.current(), 0);
    }

    #[test]
    fn nonzero_while_pushes_and_enters() {
        let (mut tape, mut memory) = tape_and_memory("[-]");
        memory.cells_mut()[0] = 2;
        assert_eq!(tape.step(&mut memory).unwrap(), Step::Continue);
        assert_eq!(tape.ip(), 1);
    }

    #[test]
    fn loop_end_with_empty_stack_is_unbalanced() {
        let (mut tape, mut memory) = tape_and_memory("]#");
        memory.cells_mut()[0] = 1;
        assert_eq!(
            tape.step(&mut memory),
            Err(MachineError::UnbalancedLoopEnd { ip: 0 })
        );
    }

    #[test]
    fn while_with_no_end_ahead_errors() {
        let (mut tape, mut memory) = tape_and_memory("[+");
        assert_eq!(
            tape.step(&mut memory),
            Err(MachineError::MissingLoopEnd { ip: 0 })
        );
    }

    #[test]
    fn no_op_only_advances() {
        let (mut tape, mut memory) = tape_and_memory("##");
        assert_eq!(tape.step(&mut memory).unwrap(), Step::Continue);
        assert_eq!(tape.ip(), 1);
        assert_eq!(tape.step(&mut memory).unwrap(), Step::Halt);
    }
}
