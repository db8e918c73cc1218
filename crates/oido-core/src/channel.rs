//! Channel positions, channel maps, and shuffle-table remapping.
//!
//! A [`ChannelMap`] names the speaker position carried by each interleaved
//! channel slot. Remapping between two maps is a per-frame permutation
//! driven by a shuffle table (see [`shuffle_table`]); the table is built
//! once when a pipeline is configured and applied per frame thereafter.

use crate::MAX_CHANNELS;
use crate::error::DspError;

/// Speaker positions. Discriminants are stable ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Position {
    /// No position assigned; maps containing this are treated as
    /// "same layout as the device".
    None = 0,
    FrontLeft = 1,
    FrontRight = 2,
    FrontCenter = 3,
    Lfe = 4,
    BackLeft = 5,
    BackRight = 6,
    FrontLeftCenter = 7,
    FrontRightCenter = 8,
    BackCenter = 9,
    SideLeft = 10,
    SideRight = 11,
    TopCenter = 12,
    TopFrontLeft = 13,
    TopFrontCenter = 14,
    TopFrontRight = 15,
    TopBackLeft = 16,
    TopBackCenter = 17,
    TopBackRight = 18,
}

/// A fixed-capacity channel layout: one [`Position`] per interleaved slot.
#[derive(Debug, Clone, Copy)]
pub struct ChannelMap {
    positions: [Position; MAX_CHANNELS],
    len: u8,
}

impl ChannelMap {
    /// The empty map, meaning "no layout requested".
    pub const EMPTY: ChannelMap = ChannelMap {
        positions: [Position::None; MAX_CHANNELS],
        len: 0,
    };

    /// Build a map from an explicit position list.
    ///
    /// The list must have between 1 and [`MAX_CHANNELS`] entries and must
    /// not repeat any position other than [`Position::None`].
    pub fn from_positions(positions: &[Position]) -> Result<Self, DspError> {
        if positions.is_empty() || positions.len() > MAX_CHANNELS {
            return Err(DspError::InvalidChannelMap("length out of range 1..=18"));
        }
        for (i, p) in positions.iter().enumerate() {
            if *p != Position::None && positions[..i].contains(p) {
                return Err(DspError::InvalidChannelMap("duplicate position"));
            }
        }
        let mut map = ChannelMap::EMPTY;
        map.positions[..positions.len()].copy_from_slice(positions);
        map.len = positions.len() as u8;
        Ok(map)
    }

    /// The standard layout for a channel count.
    ///
    /// Counts without a standard layout get an all-[`Position::None`] map of
    /// the requested length, which downstream code treats as "same layout
    /// as the device".
    pub fn default_for(channels: u16) -> Self {
        use Position::*;
        let positions: &[Position] = match channels {
            1 => &[FrontCenter],
            2 => &[FrontLeft, FrontRight],
            3 => &[FrontLeft, FrontRight, Lfe],
            4 => &[FrontLeft, FrontRight, BackLeft, BackRight],
            5 => &[FrontLeft, FrontRight, BackLeft, BackRight, Lfe],
            6 => &[FrontLeft, FrontRight, FrontCenter, Lfe, BackLeft, BackRight],
            8 => &[
                FrontLeft, FrontRight, FrontCenter, Lfe, BackLeft, BackRight, SideLeft, SideRight,
            ],
            _ => {
                let mut map = ChannelMap::EMPTY;
                map.len = channels.min(MAX_CHANNELS as u16) as u8;
                return map;
            }
        };
        let mut map = ChannelMap::EMPTY;
        map.positions[..positions.len()].copy_from_slice(positions);
        map.len = positions.len() as u8;
        map
    }

    /// Number of channels in the map.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the map is empty ("no layout requested").
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The positions, one per channel slot.
    pub fn as_slice(&self) -> &[Position] {
        &self.positions[..self.len as usize]
    }

    /// Whether the map names a position for every slot.
    ///
    /// Maps containing [`Position::None`] (including the all-`None` defaults
    /// for unusual channel counts) carry no routing information and are
    /// never remapped.
    pub fn is_positioned(&self) -> bool {
        self.len > 0 && !self.as_slice().contains(&Position::None)
    }

    /// Whether `position` appears in the map.
    pub fn contains(&self, position: Position) -> bool {
        self.as_slice().contains(&position)
    }
}

impl PartialEq for ChannelMap {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ChannelMap {}

/// Extend (or truncate) an input map to the output channel count.
///
/// The first `min(in, out)` slots copy the input map. Each extra slot takes
/// the first position that appears in the output map but not yet in the
/// post-mix map, so that up-mixed channels land where the endpoint expects
/// them. Slots that cannot be matched stay [`Position::None`].
pub fn post_mix_map(map_in: &ChannelMap, map_out: &ChannelMap) -> ChannelMap {
    let mut post = ChannelMap::EMPTY;
    post.len = map_out.len;

    let copied = map_in.len().min(map_out.len());
    post.positions[..copied].copy_from_slice(&map_in.as_slice()[..copied]);

    for slot in copied..map_out.len() {
        let next = map_out
            .as_slice()
            .iter()
            .copied()
            .find(|p| *p != Position::None && !post.positions[..slot].contains(p));
        post.positions[slot] = next.unwrap_or(Position::None);
    }
    post
}

/// Build the permutation table mapping output slots to post-mix slots.
///
/// `table[i]` is the post-mix slot whose position equals `map_out[i]`;
/// output positions with no source keep their own slot (identity).
pub fn shuffle_table(post_mix: &ChannelMap, map_out: &ChannelMap) -> [u8; MAX_CHANNELS] {
    let mut table = [0u8; MAX_CHANNELS];
    for (i, slot) in table.iter_mut().enumerate().take(map_out.len()) {
        let want = map_out.as_slice()[i];
        *slot = post_mix
            .as_slice()
            .iter()
            .position(|p| *p == want)
            .unwrap_or(i) as u8;
    }
    table
}

/// Permute every frame of an interleaved f32 buffer in place.
///
/// Each frame is copied into a stack scratch before the writes so that
/// permutations with cycles are handled correctly.
pub fn apply_shuffle(frames: &mut [f32], channels: u16, table: &[u8; MAX_CHANNELS]) {
    let ch = channels as usize;
    debug_assert!(ch <= MAX_CHANNELS);
    debug_assert_eq!(frames.len() % ch, 0);

    let mut scratch = [0.0f32; MAX_CHANNELS];
    for frame in frames.chunks_exact_mut(ch) {
        scratch[..ch].copy_from_slice(frame);
        for (i, sample) in frame.iter_mut().enumerate() {
            *sample = scratch[table[i] as usize];
        }
    }
}
