/// Bob Jenkins' lookup3 finalizer over two words; used to decorrelate the
/// random sequences of neighbouring pixels.
pub fn hash_uint2(kx: u32, ky: u32) -> u32 {
    let mut a = 0xdeadbeef_u32.wrapping_add((2 << 2) + 13);
    let mut b = a;
    let mut c = a;

    a = a.wrapping_add(kx);
    b = b.wrapping_add(ky);

    c ^= b;
    c = c.wrapping_sub(b.rotate_left(14));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(11));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(25));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(16));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(4));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(14));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(24));

    c
}
