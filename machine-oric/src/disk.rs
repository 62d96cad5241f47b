//! MFM floppy disk images.
//!
//! The on-disk format is a byte-level dump of the MFM bit stream: a
//! 256-byte header starting with the ASCII tag `MFM_DISK` and 32-bit
//! little-endian side count, track count and geometry code at offsets
//! 8, 12 and 16, followed by `sides * tracks` raw tracks of 6400 bytes
//! each. Within a track, a sector ID is marked by `A1 A1 A1 FE` and
//! carries track, side, sector and size-exponent bytes; the sector data
//! follows behind an `A1 A1 A1` sync and a data mark of `FB` (normal)
//! or `F8` (deleted), bracketed by CRC bytes. A sector's addressed data
//! excludes the mark byte and the CRCs.

/// Normal data mark.
pub const SECTOR_MARK_NORMAL: u8 = 0xFB;

/// Deleted data mark.
pub const SECTOR_MARK_DELETED: u8 = 0xF8;

/// Image header size in bytes.
const HEADER_SIZE: usize = 256;

/// Raw track dump size in bytes.
const TRACK_SIZE: usize = 6400;

/// How far past an ID field the data mark may trail.
const DATA_MARK_WINDOW: usize = 64;

/// One addressable sector.
#[derive(Clone)]
pub struct DiskSector {
    /// Sector number from the ID field
    pub number: u8,
    /// Data mark byte, `0xFB` or `0xF8`
    pub mark: u8,
    /// Payload, excluding the mark and CRC bytes
    pub data: Vec<u8>,
}

impl DiskSector {
    pub fn is_deleted(&self) -> bool {
        self.mark == SECTOR_MARK_DELETED
    }
}

/// One track: its decoded sectors plus the raw MFM byte dump.
#[derive(Clone, Default)]
pub struct DiskTrack {
    pub sectors: Vec<DiskSector>,
    /// Raw track bytes, for the read-track/write-track operations
    pub raw: Vec<u8>,
}

impl DiskTrack {
    /// Find a sector by its ID-field number.
    pub fn sector(&self, number: u8) -> Option<&DiskSector> {
        self.sectors.iter().find(|s| s.number == number)
    }

    pub fn sector_mut(&mut self, number: u8) -> Option<&mut DiskSector> {
        self.sectors.iter_mut().find(|s| s.number == number)
    }
}

/// A parsed disk image: a `sides x tracks` grid of tracks.
pub struct DiskImage {
    sides: u32,
    tracks: u32,
    geometry: u32,
    grid: Vec<DiskTrack>,
}

impl DiskImage {
    /// Parse an MFM_DISK dump.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() < HEADER_SIZE {
            return Err("image shorter than header");
        }
        if &data[0..8] != b"MFM_DISK" {
            return Err("not an MFM_DISK image");
        }

        let sides = read32(data, 8);
        let tracks = read32(data, 12);
        let geometry = read32(data, 16);

        if sides == 0 || sides > 2 || tracks == 0 || tracks > 128 {
            return Err("implausible side/track counts");
        }

        let expected = HEADER_SIZE + (sides * tracks) as usize * TRACK_SIZE;
        if data.len() < expected {
            return Err("image truncated");
        }

        log::info!(
            "disk: {} side(s), {} tracks, geometry {}",
            sides,
            tracks,
            geometry
        );

        let mut grid = Vec::with_capacity((sides * tracks) as usize);
        for index in 0..sides * tracks {
            let offset = HEADER_SIZE + index as usize * TRACK_SIZE;
            grid.push(parse_track(&data[offset..offset + TRACK_SIZE]));
        }

        Ok(Self {
            sides,
            tracks,
            geometry,
            grid,
        })
    }

    pub fn sides(&self) -> u32 {
        self.sides
    }

    pub fn tracks(&self) -> u32 {
        self.tracks
    }

    pub fn geometry(&self) -> u32 {
        self.geometry
    }

    /// Get a track by side and track number.
    pub fn track(&self, side: u8, track: u8) -> Option<&DiskTrack> {
        if (side as u32) < self.sides && (track as u32) < self.tracks {
            self.grid
                .get((side as u32 * self.tracks + track as u32) as usize)
        } else {
            None
        }
    }

    pub fn track_mut(&mut self, side: u8, track: u8) -> Option<&mut DiskTrack> {
        if (side as u32) < self.sides && (track as u32) < self.tracks {
            self.grid
                .get_mut((side as u32 * self.tracks + track as u32) as usize)
        } else {
            None
        }
    }
}

fn read32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Scan a raw track for ID fields and their data marks.
fn parse_track(raw: &[u8]) -> DiskTrack {
    let mut sectors = Vec::new();

    let mut i = 0;
    while i + 8 <= raw.len() {
        if raw[i..i + 4] != [0xA1, 0xA1, 0xA1, 0xFE] {
            i += 1;
            continue;
        }

        let sector_number = raw[i + 6];
        let size_exponent = raw[i + 7] & 0x03;
        let sector_len = 128usize << size_exponent;

        // The ID CRC and gap bytes sit between the ID field and the data
        // mark; find the sync + mark within the window.
        let search_from = i + 8;
        let mut data_mark = None;
        for j in search_from..(search_from + DATA_MARK_WINDOW).min(raw.len().saturating_sub(4)) {
            if raw[j..j + 3] == [0xA1, 0xA1, 0xA1]
                && (raw[j + 3] == SECTOR_MARK_NORMAL || raw[j + 3] == SECTOR_MARK_DELETED)
            {
                data_mark = Some(j + 3);
                break;
            }
        }

        let Some(mark_pos) = data_mark else {
            i += 8;
            continue;
        };

        let start = mark_pos + 1;
        let end = (start + sector_len).min(raw.len());
        sectors.push(DiskSector {
            number: sector_number,
            mark: raw[mark_pos],
            data: raw[start..end].to_vec(),
        });

        // Continue past the data CRC
        i = end + 2;
    }

    DiskTrack {
        sectors,
        raw: raw.to_vec(),
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use super::*;

    /// Build a one-sided image with the given sectors per track, each
    /// sector filled with a recognizable pattern.
    pub(crate) fn build_image(
        sides: u32,
        tracks: u32,
        sectors_per_track: u8,
        deleted: bool,
    ) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0..8].copy_from_slice(b"MFM_DISK");
        data[8..12].copy_from_slice(&sides.to_le_bytes());
        data[12..16].copy_from_slice(&tracks.to_le_bytes());
        data[16..20].copy_from_slice(&1u32.to_le_bytes());

        for side in 0..sides {
            for track in 0..tracks {
                let mut raw = vec![0x4E; TRACK_SIZE];
                let mut pos = 16;

                for sector in 1..=sectors_per_track {
                    // ID field
                    raw[pos..pos + 4].copy_from_slice(&[0xA1, 0xA1, 0xA1, 0xFE]);
                    raw[pos + 4] = track as u8;
                    raw[pos + 5] = side as u8;
                    raw[pos + 6] = sector;
                    raw[pos + 7] = 0x01; // 256-byte sectors
                    // ID CRC + gap
                    pos += 8 + 22;

                    // Data field
                    raw[pos..pos + 4].copy_from_slice(&[
                        0xA1,
                        0xA1,
                        0xA1,
                        if deleted {
                            SECTOR_MARK_DELETED
                        } else {
                            SECTOR_MARK_NORMAL
                        },
                    ]);
                    pos += 4;
                    for k in 0..256usize {
                        raw[pos + k] = (k as u8).wrapping_add(sector);
                    }
                    pos += 256 + 2 + 40; // data, CRC, gap
                }

                data.extend_from_slice(&raw);
            }
        }

        data
    }
}
