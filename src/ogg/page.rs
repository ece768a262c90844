use crate::ogg::{
    crc, OGG_HEADER_LEN, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS,
    OGG_SIGNATURE,
};

/// Why a byte run could not be turned into a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// More bytes are required; `needed` is the full page length known so far
    Incomplete { needed: usize },
    /// The run does not start with "OggS"
    BadCapture,
    /// Stream structure version other than 0
    BadVersion(u8),
    /// The stored checksum does not match the page contents
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageError::Incomplete { needed } => write!(f, "incomplete page ({} bytes needed)", needed),
            PageError::BadCapture => write!(f, "missing OggS capture pattern"),
            PageError::BadVersion(v) => write!(f, "unsupported stream structure version {}", v),
            PageError::ChecksumMismatch { expected, actual } => write!(
                f,
                "CRC32 mismatch: expected 0x{:08x}, got 0x{:08x}",
                expected, actual
            ),
        }
    }
}

/// OGG Page Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub header_type: u8,
    /// -1 when no packet finishes on this page
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    pub segment_table: Vec<u8>,
}

/// One verified Ogg page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    pub body: Vec<u8>,
}

impl PageHeader {
    /// Calculate total page data size from segment table
    pub fn body_len(&self) -> usize {
        self.segment_table.iter().map(|&x| x as usize).sum()
    }

    /// Header length including the segment table
    pub fn encoded_len(&self) -> usize {
        OGG_HEADER_LEN + self.segment_table.len()
    }
}

impl Page {
    /// Parse one page from the start of `data`.
    ///
    /// On success returns the page and the number of bytes it occupied. The
    /// checksum is verified, so a returned page is always intact.
    pub fn parse(data: &[u8]) -> Result<(Page, usize), PageError> {
        let prefix = data.len().min(OGG_SIGNATURE.len());
        if data[..prefix] != OGG_SIGNATURE[..prefix] {
            return Err(PageError::BadCapture);
        }
        if data.len() < OGG_HEADER_LEN {
            return Err(PageError::Incomplete { needed: OGG_HEADER_LEN });
        }

        let version = data[4];
        if version != 0 {
            return Err(PageError::BadVersion(version));
        }

        let segment_count = data[26] as usize;
        let header_len = OGG_HEADER_LEN + segment_count;
        if data.len() < header_len {
            return Err(PageError::Incomplete { needed: header_len });
        }

        let segment_table = data[OGG_HEADER_LEN..header_len].to_vec();
        let body_len: usize = segment_table.iter().map(|&x| x as usize).sum();
        let total = header_len + body_len;
        if data.len() < total {
            return Err(PageError::Incomplete { needed: total });
        }

        let expected = read_u32(&data[22..26]);
        let actual = crc::page_checksum(&data[..total]);
        if expected != actual {
            return Err(PageError::ChecksumMismatch { expected, actual });
        }

        let header = PageHeader {
            header_type: data[5],
            granule_position: i64::from_le_bytes([
                data[6], data[7], data[8], data[9], data[10], data[11], data[12], data[13],
            ]),
            serial: read_u32(&data[14..18]),
            sequence: read_u32(&data[18..22]),
            checksum: expected,
            segment_table,
        };

        Ok((
            Page {
                header,
                body: data[header_len..total].to_vec(),
            },
            total,
        ))
    }

    pub fn serial(&self) -> u32 {
        self.header.serial
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn granule_position(&self) -> i64 {
        self.header.granule_position
    }

    /// First page of a logical stream
    pub fn is_bos(&self) -> bool {
        self.header.header_type & OGG_HEADER_TYPE_BOS != 0
    }

    /// Last page of a logical stream
    pub fn is_eos(&self) -> bool {
        self.header.header_type & OGG_HEADER_TYPE_EOS != 0
    }

    /// The first segment continues a packet from the previous page
    pub fn is_continued(&self) -> bool {
        self.header.header_type & OGG_HEADER_TYPE_CONTINUATION != 0
    }

    /// Total serialized size
    pub fn encoded_len(&self) -> usize {
        self.header.encoded_len() + self.body.len()
    }

    /// Packet fragments in lacing order.
    ///
    /// Each item is a byte run and whether it terminates its packet. Runs of
    /// 255-byte segments are merged into one fragment.
    pub fn fragments(&self) -> Vec<(&[u8], bool)> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut offset = 0;
        for &lace in &self.header.segment_table {
            offset += lace as usize;
            if lace < 255 {
                out.push((&self.body[start..offset], true));
                start = offset;
            }
        }
        if start < offset {
            out.push((&self.body[start..offset], false));
        }
        out
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
