//! Named steps of the multi-pass hardware procedures.
//!
//! A channel's top machine state carries one [`GCodeState`]. While it is not
//! [`GCodeState::Normal`] the dispatcher re-polls the channel once per
//! scheduling pass; each pass does one step's work and then stays, advances
//! to [`GCodeState::successor`], or goes back to `Normal`.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GCodeState {
    #[default]
    Normal,
    WaitingForSpecialMoveToComplete,
    ProbingToolOffset,

    Homing1,
    Homing2,

    ToolChange0,
    ToolChange1,
    ToolChange2,
    ToolChangeComplete,

    M109ToolChange0,
    M109ToolChange1,
    M109ToolChange2,
    M109ToolChangeComplete,
    M109WaitForTemperature,

    Pausing1,
    Pausing2,

    Resuming1,
    Resuming2,
    Resuming3,

    Flashing1,
    Flashing2,

    Stopping,
    Sleeping,

    GridProbing1,
    GridProbing2a,
    GridProbing2b,
    GridProbing3,
    GridProbing4,
    GridProbing5,
    GridProbing6,
    GridProbing7,

    ProbingAtPoint0,
    ProbingAtPoint1,
    ProbingAtPoint2a,
    ProbingAtPoint2b,
    ProbingAtPoint3,
    ProbingAtPoint4,
    ProbingAtPoint5,
    ProbingAtPoint6,
    ProbingAtPoint7,

    DoingFirmwareRetraction,
    DoingFirmwareUnRetraction,
    LoadingFilament,
    UnloadingFilament,

    PowerFailPausing1,
}

/// A hardware procedure: an ordered run of steps ending in a terminal step.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Procedure {
    Homing,
    ToolChange,
    M109ToolChange,
    Pausing,
    Resuming,
    Flashing,
    GridProbing,
    ProbingAtPoint,
    LoadingFilament,
    UnloadingFilament,
    PowerFailPausing,
}

impl Procedure {
    pub const ALL: [Procedure; 11] = [
        Procedure::Homing,
        Procedure::ToolChange,
        Procedure::M109ToolChange,
        Procedure::Pausing,
        Procedure::Resuming,
        Procedure::Flashing,
        Procedure::GridProbing,
        Procedure::ProbingAtPoint,
        Procedure::LoadingFilament,
        Procedure::UnloadingFilament,
        Procedure::PowerFailPausing,
    ];

    pub fn steps(self) -> &'static [GCodeState] {
        use GCodeState::*;
        match self {
            Procedure::Homing => &[Homing1, Homing2],
            Procedure::ToolChange => &[ToolChange0, ToolChange1, ToolChange2, ToolChangeComplete],
            Procedure::M109ToolChange => &[
                M109ToolChange0,
                M109ToolChange1,
                M109ToolChange2,
                M109ToolChangeComplete,
                M109WaitForTemperature,
            ],
            Procedure::Pausing => &[Pausing1, Pausing2],
            Procedure::Resuming => &[Resuming1, Resuming2, Resuming3],
            Procedure::Flashing => &[Flashing1, Flashing2],
            Procedure::GridProbing => &[
                GridProbing1,
                GridProbing2a,
                GridProbing2b,
                GridProbing3,
                GridProbing4,
                GridProbing5,
                GridProbing6,
                GridProbing7,
            ],
            Procedure::ProbingAtPoint => &[
                ProbingAtPoint0,
                ProbingAtPoint1,
                ProbingAtPoint2a,
                ProbingAtPoint2b,
                ProbingAtPoint3,
                ProbingAtPoint4,
                ProbingAtPoint5,
                ProbingAtPoint6,
                ProbingAtPoint7,
            ],
            Procedure::LoadingFilament => &[LoadingFilament],
            Procedure::UnloadingFilament => &[UnloadingFilament],
            Procedure::PowerFailPausing => &[PowerFailPausing1],
        }
    }

    pub fn first(self) -> GCodeState {
        self.steps()[0]
    }

    pub fn terminal(self) -> GCodeState {
        let steps = self.steps();
        steps[steps.len() - 1]
    }
}

impl GCodeState {
    /// The procedure this step belongs to, if any.
    pub fn procedure(self) -> Option<Procedure> {
        Procedure::ALL.into_iter().find(|p| p.steps().contains(&self))
    }

    pub fn is_terminal(self) -> bool {
        self.procedure().is_some_and(|p| p.terminal() == self)
    }

    /// Next step in the same procedure. `None` on a terminal step or on a
    /// step that is not part of any procedure; the dispatcher must handle
    /// those itself.
    pub fn successor(self) -> Option<GCodeState> {
        use GCodeState::*;
        let next = match self {
            Homing1 => Homing2,

            ToolChange0 => ToolChange1,
            ToolChange1 => ToolChange2,
            ToolChange2 => ToolChangeComplete,

            M109ToolChange0 => M109ToolChange1,
            M109ToolChange1 => M109ToolChange2,
            M109ToolChange2 => M109ToolChangeComplete,
            M109ToolChangeComplete => M109WaitForTemperature,

            Pausing1 => Pausing2,

            Resuming1 => Resuming2,
            Resuming2 => Resuming3,

            Flashing1 => Flashing2,

            GridProbing1 => GridProbing2a,
            GridProbing2a => GridProbing2b,
            GridProbing2b => GridProbing3,
            GridProbing3 => GridProbing4,
            GridProbing4 => GridProbing5,
            GridProbing5 => GridProbing6,
            GridProbing6 => GridProbing7,

            ProbingAtPoint0 => ProbingAtPoint1,
            ProbingAtPoint1 => ProbingAtPoint2a,
            ProbingAtPoint2a => ProbingAtPoint2b,
            ProbingAtPoint2b => ProbingAtPoint3,
            ProbingAtPoint3 => ProbingAtPoint4,
            ProbingAtPoint4 => ProbingAtPoint5,
            ProbingAtPoint5 => ProbingAtPoint6,
            ProbingAtPoint6 => ProbingAtPoint7,

            _ => return None,
        };
        Some(next)
    }
}
