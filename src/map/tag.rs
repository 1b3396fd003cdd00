//! Which argument slot(s) of an action special carry its tag, for the
//! `putTaggingThingsWithId`/`putTaggingLinesWithId` query family.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagType {
    None,
    Sector,
    LineId,
    Line,
    LineIdLine2,
    Thing,
    Thing1Sector2,
    Thing1Sector3,
    Thing1Thing2,
    Thing1Thing4,
    Thing1Thing2Thing3,
    Sector1Thing2Thing3Thing5,
    Thing4,
    Thing5,
    Line1Sector2,
    Sector1Sector2,
    Sector1Sector2Sector3Sector4,
    Sector2Is3Line,
    Sector1Thing2,
    Patrol,
    Interpolation,
    /// Tag is `|arg0|` (Hexen teleport-style specials store a signed value).
    LineNegative,
}

/// What a tag-carrying argument slot names: a sector tag, a line id, or a
/// thing tid. `putTaggingThingsWithId`/`putTaggingLinesWithId`'s `scope`
/// parameter selects which of these a caller's `id` should be matched
/// against, since a multi-slot special (e.g. `Thing1Sector2`) mixes slot
/// kinds and an id collision in the wrong slot must not count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagSlotKind {
    Sector,
    Line,
    Thing,
}

impl TagSlotKind {
    /// Maps the `scope` string spec.md's query functions take
    /// (`"things"`/`"lines"`/`"sectors"`) to the matching slot kind.
    #[must_use]
    pub fn from_scope(scope: &str) -> Option<Self> {
        match scope {
            "things" => Some(Self::Thing),
            "lines" => Some(Self::Line),
            "sectors" => Some(Self::Sector),
            _ => None,
        }
    }
}

impl TagType {
    /// Argument indices (into a 5-slot Hexen/UDMF args array) that carry a
    /// tag value for this special, paired with which kind of id that slot
    /// names. `Patrol`/`Interpolation` carry no tag slots at all — they
    /// chain via [`Self::is_path_type`] instead.
    #[must_use]
    pub fn tag_arg_indices(self) -> &'static [(usize, TagSlotKind)] {
        use TagSlotKind::{Line as L, Sector as S, Thing as T};
        match self {
            Self::None | Self::Patrol | Self::Interpolation => &[],
            Self::Sector => &[(0, S)],
            Self::LineId | Self::Line | Self::LineNegative => &[(0, L)],
            Self::LineIdLine2 => &[(0, L), (1, L)],
            Self::Thing => &[(0, T)],
            Self::Thing1Sector2 => &[(0, T), (1, S)],
            Self::Thing1Sector3 => &[(0, T), (2, S)],
            Self::Thing1Thing2 => &[(0, T), (1, T)],
            Self::Thing1Thing4 => &[(0, T), (3, T)],
            Self::Thing1Thing2Thing3 => &[(0, T), (1, T), (2, T)],
            Self::Sector1Thing2Thing3Thing5 => &[(0, S), (1, T), (2, T), (4, T)],
            Self::Thing4 => &[(3, T)],
            Self::Thing5 => &[(4, T)],
            Self::Line1Sector2 => &[(0, L), (1, S)],
            Self::Sector1Sector2 => &[(0, S), (1, S)],
            Self::Sector1Sector2Sector3Sector4 => &[(0, S), (1, S), (2, S), (3, S)],
            Self::Sector2Is3Line => &[(1, S), (2, L)],
            Self::Sector1Thing2 => &[(0, S), (1, T)],
        }
    }

    /// `Patrol`/`Interpolation` specials link to further path points by
    /// thing *type* rather than by a tag argument equal to some id.
    #[must_use]
    pub const fn is_path_type(self) -> bool {
        matches!(self, Self::Patrol | Self::Interpolation)
    }
}
