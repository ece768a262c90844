// CRC-32 used by Ogg pages
//
// Polynomial 0x04c11db7, initial value 0, no reflection and no final XOR.
// The checksum is computed over the whole page with the CRC field zeroed.

const fn table_entry(idx: u32) -> u32 {
    let mut r: u32 = idx << 24;
    let mut i = 0;
    while i < 8 {
        r = (r << 1) ^ (-(((r >> 31) & 1) as i32) as u32 & 0x04c1_1db7);
        i += 1;
    }
    r
}

const fn lookup_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = table_entry(i as u32);
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = lookup_table();

/// Feed `data` into a running checksum (start from 0)
pub fn update(cur: u32, data: &[u8]) -> u32 {
    data.iter().fold(cur, |crc, &byte| {
        (crc << 8) ^ CRC_TABLE[((crc >> 24) ^ byte as u32) as usize]
    })
}

/// Checksum of a serialized page; bytes 22..26 are treated as zero
pub fn page_checksum(page: &[u8]) -> u32 {
    if page.len() < 26 {
        return update(0, page);
    }
    let crc = update(0, &page[..22]);
    let crc = update(crc, &[0u8; 4]);
    update(crc, &page[26..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(update(0, &[]), 0);
    }

    #[test]
    fn test_known_vector() {
        // CRC-32/MPEG-2 style register without init/xorout: "123456789" -> 0x89a1897f
        assert_eq!(update(0, b"123456789"), 0x89a1_897f);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"OggS incremental checksum";
        let split = update(update(0, &data[..7]), &data[7..]);
        assert_eq!(split, update(0, data));
    }

    #[test]
    fn test_page_checksum_ignores_crc_field() {
        let mut page = vec![0u8; 40];
        page[..4].copy_from_slice(b"OggS");
        let a = page_checksum(&page);
        page[22..26].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(page_checksum(&page), a);
    }
}
