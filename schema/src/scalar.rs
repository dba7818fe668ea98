/// A fixed-size value that can be stored directly in a buffer, always in
/// little-endian byte order regardless of the host.
pub trait Scalar: Copy + PartialEq {
    const SIZE: usize;

    /// Writes this value into the first `SIZE` bytes of `dst`.
    fn write_le(self, dst: &mut [u8]);

    /// Reads a value from the first `SIZE` bytes of `src`.
    fn read_le(src: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {$(
        impl Scalar for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn write_le(self, dst: &mut [u8]) {
                dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(src: &[u8]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                bytes.copy_from_slice(&src[..Self::SIZE]);
                <$ty>::from_le_bytes(bytes)
            }
        }
    )*}
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Scalar for bool {
    const SIZE: usize = 1;

    fn write_le(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    fn read_le(src: &[u8]) -> Self {
        src[0] != 0
    }
}

#[test]
fn round_trip_ints() {
    let mut buf = [0u8; 8];
    0x0102_0304u32.write_le(&mut buf);
    assert_eq!(&buf[..4], [4, 3, 2, 1]);
    assert_eq!(u32::read_le(&buf), 0x0102_0304);

    (-2i16).write_le(&mut buf);
    assert_eq!(&buf[..2], [254, 255]);
    assert_eq!(i16::read_le(&buf), -2);

    0x8000_0000_0000_0001u64.write_le(&mut buf);
    assert_eq!(u64::read_le(&buf), 0x8000_0000_0000_0001);
}

#[test]
fn round_trip_floats() {
    let mut buf = [0u8; 8];
    1.5f32.write_le(&mut buf);
    assert_eq!(&buf[..4], [0, 0, 192, 63]);
    assert_eq!(f32::read_le(&buf), 1.5);

    (-0.25f64).write_le(&mut buf);
    assert_eq!(f64::read_le(&buf), -0.25);
}

#[test]
fn round_trip_bool() {
    let mut buf = [0u8; 1];
    true.write_le(&mut buf);
    assert_eq!(buf, [1]);
    assert!(bool::read_le(&buf));
    false.write_le(&mut buf);
    assert_eq!(buf, [0]);
    assert!(!bool::read_le(&buf));
}
