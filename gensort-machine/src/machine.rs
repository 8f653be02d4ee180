//! The machine proper: tape + memory + the run loop with its executed-op
//! ceiling.

use crate::error::MachineError;
use crate::memory::Memory;
use crate::tape::{Step, Tape};

/// Machine tunables. Owned by the evaluator config upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Halt with [`MachineError::ExecutionLimit`] once this many ops have
    /// been attempted.
    pub max_instruction_executions: u64,
    /// Number of memory cells.
    pub memory_cell_count: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_instruction_executions: 10_000,
            memory_cell_count: 100,
        }
    }
}

/// A reusable interpreter instance.
///
/// One machine per worker thread is the intended pattern: reset, load a
/// program, load an input, run, read the output, repeat.
#[derive(Debug, Clone)]
pub struct Machine {
    tape: Tape,
    memory: Memory,
    config: MachineConfig,
    executed: u64,
}

impl Machine {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            tape: Tape::default(),
            memory: Memory::new(config.memory_cell_count),
            config: config.clone(),
            executed: 0,
        }
    }

    /// Zero memory, rewind the tape, clear the while stack and the
    /// executed-op counter. The loaded program is kept.
    pub fn reset(&mut self) {
        self.tape.reset();
        self.memory.reset();
        self.executed = 0;
    }

    /// Replace the program and rewind the tape.
    pub fn load_program(&mut self, program: &[u8]) {
        self.tape.load(program);
    }

    /// Write `input` into cells `0..input.len()`.
    pub fn load_memory(&mut self, input: &[u8]) -> Result<(), MachineError> {
        if input.len() > self.memory.len() {
            return Err(MachineError::InputTooLong {
                len: input.len(),
                capacity: self.memory.len(),
            });
        }
        self.memory.cells_mut()[..input.len()].copy_from_slice(input);
        Ok(())
    }

    /// Read the first `count` cells.
    pub fn read_memory(&self, count: usize) -> Result<&[u8], MachineError> {
        if count > self.memory.len() {
            return Err(MachineError::ReadTooLong {
                count,
                capacity: self.memory.len(),
            });
        }
        Ok(&self.memory.cells()[..count])
    }

    /// Execute until the tape ends (Ok), an op fails, or the executed-op
    /// ceiling is hit. The ceiling takes precedence over a same-step op
    /// error.
    pub fn run(&mut self) -> Result<(), MachineError> {
        loop {
            let step = self.tape.step(&mut self.memory);
            self.executed += 1;
            if self.executed >= self.config.max_instruction_executions {
                return Err(MachineError::ExecutionLimit {
                    executed: self.executed,
                });
            }
            match step? {
                Step::Continue => {}
                Step::Halt => return Ok(()),
            }
        }
    }

    /// Ops attempted during the last run.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op;

    fn machine() -> Machine {
        Machine::new(&MachineConfig {
            max_instruction_executions: 10_000,
            memory_cell_count: 100,
        })
    }

    fn run_with_input(program: &str, input: &[u8]) -> Result<Machine, MachineError> {
        let mut m = machine();
        m.load_program(program.as_bytes());
        m.load_memory(input)?;
        m.run()?;
        Ok(m)
    }

    #[test]
    fn set_to_zero_clears_the_cell() {
        let m = run_with_input(op::SET_TO_ZERO, &[1]).unwrap();
        assert_eq!(m.read_memory(1).unwrap(), &[0]);
    }

    #[test]
    fn nested_loops_unwind() {
        let m = run_with_input("[[[-]+-]+-]>+", &[1]).unwrap();
        assert_eq!(m.read_memory(2).unwrap(), &[0, 1]);
    }

    #[test]
    fn simple_counting_loop() {
        let m = run_with_input("++++[>+>+>+>+<<<<-]", &[0]).unwrap();
        assert_eq!(m.read_memory(5).unwrap(), &[0, 4, 4, 4, 4]);
    }

    #[test]
    fn no_ops_are_transparent_in_nested_loops() {
        let m = run_with_input("++[#>++++[#>+>+>+>+<<<<-#]<-#]", &[0]).unwrap();
        assert_eq!(m.read_memory(6).unwrap(), &[0, 0, 8, 8, 8, 8]);
    }

    #[test]
    fn hello_world_cell_pattern() {
        let m = run_with_input(
            "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]",
            &[0],
        )
        .unwrap();
        assert_eq!(m.read_memory(7).unwrap(), &[0, 0, 72, 104, 88, 32, 8]);
        assert_eq!(m.executed(), 912);
    }

    #[test]
    fn bookmark_moves_value_to_scratch_cell() {
        let m = run_with_input(op::MOVE_TO_ZERO_RIGHT, &[5]).unwrap();
        assert_eq!(m.read_memory(2).unwrap(), &[0, 5]);
    }

    #[test]
    fn bookmark_pulls_value_back_left() {
        let m = run_with_input(">*[<]^[-^+^]", &[0, 7]).unwrap();
        assert_eq!(m.read_memory(2).unwrap(), &[7, 0]);
    }

    #[test]
    fn swap_prefabs_halt_cleanly() {
        let m = run_with_input(op::SWAP_RIGHT, &[20, 40]).unwrap();
        assert_eq!(m.read_memory(1).unwrap(), &[0]);
    }

    #[test]
    fn execution_limit_reports_not_panics() {
        let mut m = Machine::new(&MachineConfig {
            max_instruction_executions: 10,
            memory_cell_count: 100,
        });
        m.load_program(op::SWAP_LEFT.as_bytes());
        m.load_memory(&[10, 20, 30]).unwrap();
        assert_eq!(m.run(), Err(MachineError::ExecutionLimit { executed: 10 }));
    }

    #[test]
    fn infinite_loop_hits_the_ceiling() {
        let mut m = machine();
        m.load_program(b"+[]");
        assert!(m.run().unwrap_err().is_execution_limit());
    }

    #[test]
    fn pointer_left_at_zero_fails() {
        let err = run_with_input("<", &[0]).unwrap_err();
        assert_eq!(err, MachineError::PointerUnderflow { ip: 0 });
    }

    #[test]
    fn load_memory_rejects_oversized_input() {
        let mut m = Machine::new(&MachineConfig {
            max_instruction_executions: 10,
            memory_cell_count: 1,
        });
        assert_eq!(
            m.load_memory(&[1, 2]),
            Err(MachineError::InputTooLong {
                len: 2,
                capacity: 1
            })
        );
    }

    #[test]
    fn read_memory_rejects_oversized_count() {
        let m = machine();
        assert_eq!(
            m.read_memory(101).unwrap_err(),
            MachineError::ReadTooLong {
                count: 101,
                capacity: 100
            }
        );
    }

    #[test]
    fn reset_makes_the_machine_reusable() {
        let mut m = machine();
        m.load_program(b"+++");
        m.run().unwrap();
        assert_eq!(m.executed(), 3);

        m.reset();
        assert_eq!(m.executed(), 0);
        assert_eq!(m.read_memory(1).unwrap(), &[0]);
        m.run().unwrap();
        assert_eq!(m.read_memory(1).unwrap(), &[3]);
    }

    #[test]
    fn balanced_programs_never_panic() {
        let programs = ["", "[-]", "[>]", "[<]", "+[-]", "++[->+<]", "#"];
        for program in programs {
            let mut m = machine();
            m.load_program(program.as_bytes());
            m.load_memory(&[3, 1]).unwrap();
            // Empty tape errors, everything else halts or hits the ceiling.
            let _ = m.run();
        }
    }
}
