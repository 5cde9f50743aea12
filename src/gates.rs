use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul};

/// Four-channel weight bundle, one lane per gate pre-activation.
///
/// Every projection weight, weight delta, and learning-rate accumulator is a
/// `GateQuad`; keeping the four gate contributions of one (unit, feature)
/// pair adjacent lets the whole update run as component-wise arithmetic.
/// Channel order is fixed: input gate, forget gate, cell candidate, output
/// gate — the same order the forward pass reads and the weight file stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GateQuad {
    pub input: f32,
    pub forget: f32,
    pub cell: f32,
    pub output: f32,
}

/// Three-channel variant for quantities that have no output-gate lane:
/// derivative history and the peephole learning rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GateTriple {
    pub input: f32,
    pub forget: f32,
    pub cell: f32,
}

impl GateQuad {
    pub fn new(input: f32, forget: f32, cell: f32, output: f32) -> Self {
        GateQuad { input, forget, cell, output }
    }

    pub fn splat(v: f32) -> Self {
        GateQuad::new(v, v, v, v)
    }

    /// Extends a triple with an explicit output-gate lane.
    pub fn from_triple(t: GateTriple, output: f32) -> Self {
        GateQuad::new(t.input, t.forget, t.cell, output)
    }

    /// Component-wise clamp to the symmetric range [-cutoff, cutoff].
    pub fn clamp(self, cutoff: f32) -> Self {
        GateQuad::new(
            self.input.clamp(-cutoff, cutoff),
            self.forget.clamp(-cutoff, cutoff),
            self.cell.clamp(-cutoff, cutoff),
            self.output.clamp(-cutoff, cutoff),
        )
    }

    pub fn sqrt(self) -> Self {
        GateQuad::new(self.input.sqrt(), self.forget.sqrt(), self.cell.sqrt(), self.output.sqrt())
    }
}

impl GateTriple {
    pub fn new(input: f32, forget: f32, cell: f32) -> Self {
        GateTriple { input, forget, cell }
    }

    pub fn splat(v: f32) -> Self {
        GateTriple::new(v, v, v)
    }

    pub fn clamp(self, cutoff: f32) -> Self {
        GateTriple::new(
            self.input.clamp(-cutoff, cutoff),
            self.forget.clamp(-cutoff, cutoff),
            self.cell.clamp(-cutoff, cutoff),
        )
    }

    pub fn sqrt(self) -> Self {
        GateTriple::new(self.input.sqrt(), self.forget.sqrt(), self.cell.sqrt())
    }
}

impl Add for GateQuad {
    type Output = GateQuad;
    fn add(self, rhs: GateQuad) -> GateQuad {
        GateQuad::new(
            self.input + rhs.input,
            self.forget + rhs.forget,
            self.cell + rhs.cell,
            self.output + rhs.output,
        )
    }
}

impl AddAssign for GateQuad {
    fn add_assign(&mut self, rhs: GateQuad) {
        *self = *self + rhs;
    }
}

impl Mul for GateQuad {
    type Output = GateQuad;
    fn mul(self, rhs: GateQuad) -> GateQuad {
        GateQuad::new(
            self.input * rhs.input,
            self.forget * rhs.forget,
            self.cell * rhs.cell,
            self.output * rhs.output,
        )
    }
}

impl Mul<f32> for GateQuad {
    type Output = GateQuad;
    fn mul(self, rhs: f32) -> GateQuad {
        GateQuad::new(self.input * rhs, self.forget * rhs, self.cell * rhs, self.output * rhs)
    }
}

impl Div for GateQuad {
    type Output = GateQuad;
    fn div(self, rhs: GateQuad) -> GateQuad {
        GateQuad::new(
            self.input / rhs.input,
            self.forget / rhs.forget,
            self.cell / rhs.cell,
            self.output / rhs.output,
        )
    }
}

impl Add for GateTriple {
    type Output = GateTriple;
    fn add(self, rhs: GateTriple) -> GateTriple {
        GateTriple::new(self.input + rhs.input, self.forget + rhs.forget, self.cell + rhs.cell)
    }
}

impl AddAssign for GateTriple {
    fn add_assign(&mut self, rhs: GateTriple) {
        *self = *self + rhs;
    }
}

impl Mul for GateTriple {
    type Output = GateTriple;
    fn mul(self, rhs: GateTriple) -> GateTriple {
        GateTriple::new(self.input * rhs.input, self.forget * rhs.forget, self.cell * rhs.cell)
    }
}

impl Mul<f32> for GateTriple {
    type Output = GateTriple;
    fn mul(self, rhs: f32) -> GateTriple {
        GateTriple::new(self.input * rhs, self.forget * rhs, self.cell * rhs)
    }
}

impl Div for GateTriple {
    type Output = GateTriple;
    fn div(self, rhs: GateTriple) -> GateTriple {
        GateTriple::new(self.input / rhs.input, self.forget / rhs.forget, self.cell / rhs.cell)
    }
}
