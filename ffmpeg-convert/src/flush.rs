use serde::Serialize;

/// End-of-input progress of one stream pipeline.
///
/// Stages only ever move forward, one step at a time, and `Done` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStage {
    Streaming,
    DrainDecoder,
    DrainAdapter,
    DrainAligner,
    DrainEncoder,
    Done,
}

impl FlushStage {
    pub fn next(self) -> Self {
        match self {
            FlushStage::Streaming => FlushStage::DrainDecoder,
            FlushStage::DrainDecoder => FlushStage::DrainAdapter,
            FlushStage::DrainAdapter => FlushStage::DrainAligner,
            FlushStage::DrainAligner => FlushStage::DrainEncoder,
            FlushStage::DrainEncoder | FlushStage::Done => FlushStage::Done,
        }
    }

    pub fn is_done(self) -> bool {
        self == FlushStage::Done
    }
}

/// Per-pipeline cursor through [`FlushStage`].
#[derive(Debug)]
pub struct FlushSequencer {
    stage: FlushStage,
}

impl Default for FlushSequencer {
    fn default() -> Self {
        Self {
            stage: FlushStage::Streaming,
        }
    }
}

impl FlushSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> FlushStage {
        self.stage
    }

    pub fn is_streaming(&self) -> bool {
        self.stage == FlushStage::Streaming
    }

    /// Moves to the next drain stage and returns it, `None` once done.
    ///
    /// The caller must have fully exhausted the current stage before
    /// advancing.
    pub fn advance(&mut self) -> Option<FlushStage> {
        if self.stage.is_done() {
            return None;
        }
        self.stage = self.stage.next();
        match self.stage {
            FlushStage::Done => None,
            stage => Some(stage),
        }
    }

    /// Skips every remaining stage.
    pub fn finish(&mut self) {
        self.stage = FlushStage::Done;
    }
}
