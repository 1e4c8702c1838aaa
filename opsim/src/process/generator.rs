//! Random program generation.

use super::{Instruction, LOOP_DEPTH, Operand, PrintPart};
use num_enum::TryFromPrimitive;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Number of distinct variable names a generated program uses.
const VARIABLE_POOL: u16 = 8;

/// Produces the program of a new process.
pub trait ProgramGenerator: Send {
    /// Generates a program of exactly `count` instructions for the process
    /// `name` owning `memory_size` bytes.
    fn generate(&mut self, name: &str, count: usize, memory_size: usize) -> Vec<Instruction>;

    /// Picks a program length within `[min, max]`.
    fn length(&mut self, min: u64, max: u64) -> usize;

    /// Picks an element of `choices`.
    fn pick(&mut self, choices: &[usize]) -> Option<usize>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
enum InstructionKind {
    Print = 0,
    Declare = 1,
    Add = 2,
    Subtract = 3,
    Sleep = 4,
    For = 5,
    Read = 6,
    Write = 7,
}

/// A [`ProgramGenerator`] drawing instructions uniformly at random.
///
/// Generated programs keep every loop balanced and never nest deeper than
/// [`LOOP_DEPTH`]. Memory instructions only touch addresses inside the
/// address space of the process.
pub struct RandomProgram<R: Rng = StdRng> {
    rng: R,
}

impl RandomProgram<StdRng> {
    /// Creates a generator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a deterministic generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RandomProgram<R> {
    fn variable(&mut self) -> String {
        format!("var{}", self.rng.gen_range(0..VARIABLE_POOL))
    }

    fn operand(&mut self) -> Operand {
        if self.rng.gen_bool(0.5) {
            Operand::Literal(self.rng.gen_range(0..100))
        } else {
            Operand::Var(self.variable())
        }
    }

    fn address(&mut self, memory_size: usize) -> usize {
        self.rng.gen_range(0..memory_size.max(1))
    }
}

impl<R: Rng + Send> ProgramGenerator for RandomProgram<R> {
    fn generate(&mut self, name: &str, count: usize, memory_size: usize) -> Vec<Instruction> {
        let mut program = Vec::with_capacity(count);
        let mut open = 0usize;
        while program.len() < count {
            let left = count - program.len();
            // Close loops when only their ENDs fit, and now and then anyway.
            if open > 0 && (left == open || self.rng.gen_bool(0.25)) {
                program.push(Instruction::ForEnd);
                open -= 1;
                continue;
            }
            let kind = InstructionKind::try_from(self.rng.gen_range(0..8u8))
                .unwrap_or(InstructionKind::Print);
            let instruction = match kind {
                InstructionKind::Print => {
                    Instruction::Print(vec![PrintPart::Text(format!("Hello world from {name}!"))])
                }
                InstructionKind::Declare => Instruction::Declare {
                    var: self.variable(),
                    value: self.rng.gen_range(0..100),
                },
                InstructionKind::Add => Instruction::Add {
                    dst: self.variable(),
                    lhs: self.operand(),
                    rhs: self.operand(),
                },
                InstructionKind::Subtract => Instruction::Subtract {
                    dst: self.variable(),
                    lhs: self.operand(),
                    rhs: self.operand(),
                },
                InstructionKind::Sleep => Instruction::Sleep(self.rng.gen_range(1..=10)),
                // Room for the FOR, its END and the ENDs of the outer loops.
                InstructionKind::For if open < LOOP_DEPTH && left >= open + 2 => {
                    open += 1;
                    Instruction::ForStart(self.rng.gen_range(1..=5))
                }
                InstructionKind::For => Instruction::Declare {
                    var: self.variable(),
                    value: self.rng.gen_range(0..100),
                },
                InstructionKind::Read => Instruction::Read {
                    var: self.variable(),
                    addr: self.address(memory_size),
                },
                InstructionKind::Write => Instruction::Write {
                    addr: self.address(memory_size),
                    value: self.operand(),
                },
            };
            program.push(instruction);
        }
        program
    }

    fn length(&mut self, min: u64, max: u64) -> usize {
        let len = if min >= max {
            min
        } else {
            self.rng.gen_range(min..=max)
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    fn pick(&mut self, choices: &[usize]) -> Option<usize> {
        if choices.is_empty() {
            None
        } else {
            Some(choices[self.rng.gen_range(0..choices.len())])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_profile(program: &[Instruction]) -> (usize, isize) {
        let (mut deepest, mut depth) = (0usize, 0isize);
        for instruction in program {
            match instruction {
                Instruction::ForStart(_) => depth += 1,
                Instruction::ForEnd => depth -= 1,
                _ => (),
            }
            assert!(depth >= 0);
            deepest = deepest.max(depth as usize);
        }
        (deepest, depth)
    }

    #[test]
    fn exact_length_and_balanced_loops() {
        let mut generator = RandomProgram::seeded(7);
        for count in [1, 2, 3, 5, 17, 200, 1000] {
            let program = generator.generate("p01", count, 256);
            assert_eq!(program.len(), count);
            let (deepest, open) = depth_profile(&program);
            assert_eq!(open, 0);
            assert!(deepest <= LOOP_DEPTH);
        }
    }

    #[test]
    fn addresses_stay_in_bounds() {
        let mut generator = RandomProgram::seeded(11);
        for instruction in generator.generate("p", 2000, 128) {
            match instruction {
                Instruction::Read { addr, .. } | Instruction::Write { addr, .. } => {
                    assert!(addr < 128)
                }
                _ => (),
            }
        }
    }

    #[test]
    fn length_within_bounds() {
        let mut generator = RandomProgram::seeded(3);
        assert_eq!(generator.length(5, 5), 5);
        for _ in 0..100 {
            assert!((10..=20).contains(&generator.length(10, 20)));
        }
        assert_eq!(generator.pick(&[]), None);
        assert_eq!(generator.pick(&[64]), Some(64));
    }
}
