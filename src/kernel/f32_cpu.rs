fn read_f32(bytes: &[u8], i: usize) -> f32 {
    let o = i * 4;
    f32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
}

fn write_f32(bytes: &mut [u8], i: usize, v: f32) {
    let o = i * 4;
    bytes[o..o + 4].copy_from_slice(&v.to_le_bytes());
}

pub fn binary_f32_cpu(src1: &[u8], src2: &[u8], dst: &mut [u8], op: impl Fn(f32, f32) -> f32) {
    for i in 0..dst.len() / 4 {
        write_f32(dst, i, op(read_f32(src1, i), read_f32(src2, i)));
    }
}

pub fn unary_f32_cpu(src: &[u8], dst: &mut [u8], op: impl Fn(f32) -> f32) {
    for i in 0..dst.len() / 4 {
        write_f32(dst, i, op(read_f32(src, i)));
    }
}
