use nalgebra::Vector3;

/// Rejects frames whose position jumps too far from the last accepted one.
///
/// At most `max_outliers` frames in a row are rejected; the next frame is
/// accepted unconditionally so that a genuine fast movement is eventually
/// followed.
#[derive(Debug, Clone, Default)]
pub struct OutlierGate {
    last_accepted: Option<Vector3<f64>>,
    consecutive: usize,
}

/// Result of checking one position against the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierDecision {
    Accepted,
    Rejected,
    /// Exceeded the threshold but the rejection budget was exhausted
    Forced,
}

impl OutlierDecision {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl OutlierGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, position: &Vector3<f64>, threshold: f64, max_outliers: usize) -> OutlierDecision {
        let Some(last) = self.last_accepted else {
            self.accept(position);
            return OutlierDecision::Accepted;
        };

        let jump = (position - last).norm();
        if jump <= threshold {
            self.accept(position);
            return OutlierDecision::Accepted;
        }

        if self.consecutive < max_outliers {
            self.consecutive += 1;
            log::debug!("Outlier rejected: jump {jump:.1} > {threshold:.1} ({} in a row)", self.consecutive);
            return OutlierDecision::Rejected;
        }

        log::debug!("Accepting jump {jump:.1} after {} consecutive outliers", self.consecutive);
        self.accept(position);
        OutlierDecision::Forced
    }

    fn accept(&mut self, position: &Vector3<f64>) {
        self.last_accepted = Some(*position);
        self.consecutive = 0;
    }

    /// Number of frames rejected in a row so far
    #[must_use]
    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
