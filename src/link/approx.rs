//! The nine link flow/derivative approximation levels.
//!
//! A function-pointer table would be the traditional way to dispatch these,
//! but a closed `enum` plus `match` inside the line's compute methods gives
//! the same dispatch with exhaustiveness checking: the nine branches are
//! unavoidable, and a lookup table adds no clarity over a match.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Approx {
    #[default]
    Full,
    Decoupled,
    SmallAngle,
    SmallAngleDecoupled,
    Simplified,
    SimplifiedDecoupled,
    SimplifiedSmallAngle,
    FastDecoupled,
    Linear,
}

impl Approx {
    pub fn is_decoupled(self) -> bool {
        matches!(
            self,
            Approx::Decoupled
                | Approx::SmallAngleDecoupled
                | Approx::SimplifiedDecoupled
                | Approx::FastDecoupled
        )
    }

    pub fn is_small_angle(self) -> bool {
        matches!(
            self,
            Approx::SmallAngle | Approx::SmallAngleDecoupled | Approx::SimplifiedSmallAngle
        )
    }

    pub fn is_simplified(self) -> bool {
        matches!(
            self,
            Approx::Simplified
                | Approx::SimplifiedDecoupled
                | Approx::SimplifiedSmallAngle
                | Approx::FastDecoupled
        )
    }

    pub fn is_linear(self) -> bool {
        matches!(self, Approx::Linear)
    }
}
