//! Glyph alphabet and the built-in level.
//!
//! Levels are row-major byte strings; each byte is the ASCII character of
//! its glyph, so the wire format and the authoring format are the same.

use flashes_net::protocol::GameMap;

const DEFAULT_MAP_SIZE: u8 = 16;
const DEFAULT_CELL_WIDTH: u8 = 40;
const DEFAULT_CAMERA_WIDTH: u8 = 12;

const MAP_ROWS: [&str; 16] = [
    "G.........T....T",
    ".........T.TT...",
    ".T...TT.......T.",
    "T..T....T....T..",
    ".....TTT.......T",
    "TTT.....T...TT.T",
    "TT.T....TT.TTT..",
    "..T...TT.TXTTTT.",
    ".TT...TTTT...PTT",
    "TT....T..TT_.TT.",
    "TTTT..TTTTTTTTT.",
    ".......T.T.T....",
    "......T...X.....",
    "T....T.T..T.T.T.",
    ".T.TTTTT...TTT..",
    ".........T.T.TT.",
];

/// One map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    /// Pathfinding target marker.
    Target,
    /// Impassable water.
    Water,
    /// Impassable tree.
    Tree,
    /// Impassable rock.
    Rock,
    /// Walkable floor.
    Floor,
    /// Player spawn.
    Player,
    /// Monster spawn.
    Monster,
    /// A monster already defeated.
    DefeatedMonster,
}

impl TryFrom<u8> for Glyph {
    type Error = UnknownGlyph;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'X' => Ok(Glyph::Target),
            b'_' => Ok(Glyph::Water),
            b'T' => Ok(Glyph::Tree),
            b'*' => Ok(Glyph::Rock),
            b'.' => Ok(Glyph::Floor),
            b'P' => Ok(Glyph::Player),
            b'G' => Ok(Glyph::Monster),
            b'g' => Ok(Glyph::DefeatedMonster),
            other => Err(UnknownGlyph(other)),
        }
    }
}

impl From<Glyph> for u8 {
    fn from(value: Glyph) -> Self {
        match value {
            Glyph::Target => b'X',
            Glyph::Water => b'_',
            Glyph::Tree => b'T',
            Glyph::Rock => b'*',
            Glyph::Floor => b'.',
            Glyph::Player => b'P',
            Glyph::Monster => b'G',
            Glyph::DefeatedMonster => b'g',
        }
    }
}

/// A byte that is not part of the glyph alphabet.
#[derive(Debug, thiserror::Error)]
#[error("unexpected byte {0:#04x} found for map glyph")]
pub struct UnknownGlyph(pub u8);

/// The built-in level every session plays on. The rows pass through the
/// glyph alphabet so a typo in them cannot reach the wire.
pub fn default_map() -> GameMap {
    let level = MAP_ROWS
        .join("")
        .bytes()
        .map(|b| Glyph::try_from(b).map(u8::from))
        .collect::<Result<Vec<u8>, _>>()
        .expect("built-in level uses only known glyphs");

    GameMap {
        level,
        width: DEFAULT_MAP_SIZE,
        cell_width: DEFAULT_CELL_WIDTH,
        view_width: DEFAULT_CAMERA_WIDTH,
    }
}
