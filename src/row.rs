// Fixed-width row codec.
//
// A row is (id, username, email) serialized into exactly ROW_SIZE bytes:
// the id as a little-endian u32, then each string as a null-padded array
// one byte longer than its column capacity. The codec is infallible; string
// lengths are validated before a Row is constructed.

use std::fmt;

/// Maximum username length in bytes (excluding the trailing null).
pub const COLUMN_USERNAME_SIZE: usize = 32;
/// Maximum email length in bytes (excluding the trailing null).
pub const COLUMN_EMAIL_SIZE: usize = 255;

pub const ID_SIZE: usize = 4;
pub const USERNAME_SIZE: usize = COLUMN_USERNAME_SIZE + 1;
pub const EMAIL_SIZE: usize = COLUMN_EMAIL_SIZE + 1;

pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

/// Serialized width of a row: 4 + 33 + 256 = 293 bytes.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

/// A single user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    /// Serialize into the first ROW_SIZE bytes of `buf`.
    ///
    /// Bytes past each string are zeroed so a slot can be reused without
    /// leaking a previous occupant.
    pub fn serialize(&self, buf: &mut [u8]) {
        buf[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        write_padded(
            &mut buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE],
            self.username.as_bytes(),
        );
        write_padded(
            &mut buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE],
            self.email.as_bytes(),
        );
    }

    /// Deserialize from the first ROW_SIZE bytes of `buf`.
    pub fn deserialize(buf: &[u8]) -> Row {
        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + ID_SIZE]);
        Row {
            id: u32::from_le_bytes(id_bytes),
            username: read_padded(&buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]),
            email: read_padded(&buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}

fn write_padded(dest: &mut [u8], src: &[u8]) {
    dest[..src.len()].copy_from_slice(src);
    dest[src.len()..].fill(0);
}

fn read_padded(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}
