// control_system/phases.rs
//
// Actions, phase codes and the movement tables that say which traffic
// movements each action releases.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TlcsError};

/// A signal-phase combination chosen by the controller, in `[0, num_actions)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Action(pub usize);

/// Phase index understood by the gateway's traffic light program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseCode(pub u32);

impl Action {
    /// Green phases are laid out as `2 * action` in environment.net.xml.
    pub fn green_phase(self) -> PhaseCode {
        PhaseCode(self.0 as u32 * 2)
    }

    /// The yellow phase always follows its green.
    pub fn yellow_phase(self) -> PhaseCode {
        PhaseCode(self.green_phase().0 + 1)
    }

    pub fn phase_codes(self) -> (PhaseCode, PhaseCode) {
        (self.green_phase(), self.yellow_phase())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action {}", self.0)
    }
}

impl PhaseCode {
    pub fn is_yellow(self) -> bool {
        self.0 % 2 == 1
    }

    /// The action whose green or yellow this code is.
    pub fn action(self) -> Action {
        Action((self.0 / 2) as usize)
    }
}

/// An origin -> destination path through the intersection.
/// Through movements are named by origin and destination, `*Left` movements
/// are left turns from the named origin. Right turns share the lanes and the
/// green of the through movement from the same origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Movement {
    NorthSouth,
    SouthNorth,
    EastWest,
    WestEast,
    SouthLeft,
    NorthLeft,
    WestLeft,
    EastLeft,
}

impl Movement {
    pub const COUNT: usize = 8;

    /// Fixed enumeration order. Starvation scans walk it front to back.
    pub const ALL: [Movement; Movement::COUNT] = [
        Movement::NorthSouth,
        Movement::SouthNorth,
        Movement::EastWest,
        Movement::WestEast,
        Movement::SouthLeft,
        Movement::NorthLeft,
        Movement::WestLeft,
        Movement::EastLeft,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_left_turn(self) -> bool {
        matches!(
            self,
            Movement::SouthLeft | Movement::NorthLeft | Movement::WestLeft | Movement::EastLeft
        )
    }

    /// Slot of the intersection state that counts vehicles queued for this movement.
    pub fn state_slot(self) -> usize {
        match self {
            Movement::WestEast => 0,
            Movement::WestLeft => 1,
            Movement::NorthSouth => 2,
            Movement::NorthLeft => 3,
            Movement::EastWest => 4,
            Movement::EastLeft => 5,
            Movement::SouthNorth => 6,
            Movement::SouthLeft => 7,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Movement::NorthSouth => "NS",
            Movement::SouthNorth => "SN",
            Movement::EastWest => "EW",
            Movement::WestEast => "WE",
            Movement::SouthLeft => "SL",
            Movement::NorthLeft => "NL",
            Movement::WestLeft => "WL",
            Movement::EastLeft => "EL",
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Set of movements, one bit per `Movement::index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovementSet(u8);

impl MovementSet {
    pub const EMPTY: MovementSet = MovementSet(0);

    pub fn of(movements: &[Movement]) -> Self {
        movements
            .iter()
            .fold(Self::EMPTY, |set, m| MovementSet(set.0 | (1 << m.index())))
    }

    pub fn contains(self, movement: Movement) -> bool {
        self.0 & (1 << movement.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Movement> {
        Movement::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

/// The two phase programs the intersection ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseScheme {
    /// NS through, NS left, EW through, EW left.
    Base,
    /// Base plus one single-approach phase per direction (W, E, N, S).
    Extended,
}

impl PhaseScheme {
    pub fn for_actions(num_actions: usize) -> Result<Self> {
        match num_actions {
            4 => Ok(PhaseScheme::Base),
            8 => Ok(PhaseScheme::Extended),
            n => Err(TlcsError::PhaseScheme(format!(
                "no phase program with {} actions (expected 4 or 8)",
                n
            ))),
        }
    }

    pub fn num_actions(self) -> usize {
        match self {
            PhaseScheme::Base => 4,
            PhaseScheme::Extended => 8,
        }
    }
}

/// Which movements every action serves, and which action clears a starved movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTable {
    served: Vec<MovementSet>,
    overrides: [Action; Movement::COUNT],
}

impl PhaseTable {
    pub fn new(scheme: PhaseScheme) -> Result<Self> {
        use Movement::*;

        let mut served = vec![
            MovementSet::of(&[NorthSouth, SouthNorth]),
            MovementSet::of(&[NorthLeft, SouthLeft]),
            MovementSet::of(&[EastWest, WestEast]),
            MovementSet::of(&[WestLeft, EastLeft]),
        ];

        let overrides = match scheme {
            PhaseScheme::Base => {
                // Each starved movement is cleared by the base action that serves it.
                let mut overrides = [Action(0); Movement::COUNT];
                for movement in Movement::ALL {
                    let action = served
                        .iter()
                        .position(|set| set.contains(movement))
                        .map(Action)
                        .unwrap_or(Action(usize::MAX));
                    overrides[movement.index()] = action;
                }
                overrides
            }
            PhaseScheme::Extended => {
                served.extend([
                    MovementSet::of(&[WestEast, WestLeft]),
                    MovementSet::of(&[EastWest, EastLeft]),
                    MovementSet::of(&[NorthSouth, NorthLeft]),
                    MovementSet::of(&[SouthNorth, SouthLeft]),
                ]);
                // Starved movements are cleared by the single-approach phase of their origin.
                let mut overrides = [Action(0); Movement::COUNT];
                for movement in Movement::ALL {
                    overrides[movement.index()] = match movement {
                        WestEast | WestLeft => Action(4),
                        EastWest | EastLeft => Action(5),
                        NorthSouth | NorthLeft => Action(6),
                        SouthNorth | SouthLeft => Action(7),
                    };
                }
                overrides
            }
        };

        Self::from_parts(served, overrides)
    }

    /// Builds a table from explicit parts, rejecting any table where an override
    /// would pick an action that does not actually release the starved movement.
    pub fn from_parts(
        served: Vec<MovementSet>,
        overrides: [Action; Movement::COUNT],
    ) -> Result<Self> {
        if served.is_empty() {
            return Err(TlcsError::PhaseScheme("phase table has no actions".into()));
        }
        if let Some(idle) = served.iter().position(|set| set.is_empty()) {
            return Err(TlcsError::PhaseScheme(format!(
                "action {} serves no movement",
                idle
            )));
        }
        for movement in Movement::ALL {
            let action = overrides[movement.index()];
            match served.get(action.0) {
                None => {
                    return Err(TlcsError::PhaseScheme(format!(
                        "override for {} points at {} but only {} actions exist",
                        movement,
                        action,
                        served.len()
                    )))
                }
                Some(set) if !set.contains(movement) => {
                    return Err(TlcsError::PhaseScheme(format!(
                        "override for {} picks {} which does not serve it",
                        movement, action
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(Self { served, overrides })
    }

    pub fn num_actions(&self) -> usize {
        self.served.len()
    }

    pub fn contains(&self, action: Action) -> bool {
        action.0 < self.served.len()
    }

    pub fn served(&self, action: Action) -> Result<MovementSet> {
        self.served.get(action.0).copied().ok_or_else(|| {
            TlcsError::PhaseScheme(format!(
                "{} is outside the phase table ({} actions)",
                action,
                self.served.len()
            ))
        })
    }

    pub fn override_action(&self, movement: Movement) -> Action {
        self.overrides[movement.index()]
    }
}
