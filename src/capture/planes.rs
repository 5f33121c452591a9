//! Planar/semi-planar YUV 4:2:0 to packed NV21.
//!
//! Sensor planes arrive with arbitrary row padding and pixel interleaving. The
//! packed output is always `w*h` luma bytes followed by `w*h/2` bytes of V,U
//! pairs. Every plane is bounds-checked up front, so a short buffer is reported
//! as [`ConversionError::Truncated`] instead of producing garbage.

use bytes::Bytes;

use crate::capture::frame::{PackedFrame, Plane, RawFrame};
use crate::error::{ConversionError, PlaneKind};

/// Pack a sensor frame into canonical NV21.
pub fn pack_frame(frame: &RawFrame) -> Result<PackedFrame, ConversionError> {
    pack_planes(frame.width, frame.height, &frame.y, &frame.u, &frame.v)
}

/// Pack three planes into canonical NV21.
///
/// The chroma planes share `u`'s row and pixel strides, as camera HALs report
/// them for YUV_420_888.
pub fn pack_planes(
    width: u32,
    height: u32,
    y: &Plane,
    u: &Plane,
    v: &Plane,
) -> Result<PackedFrame, ConversionError> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(ConversionError::InvalidDimensions { width, height });
    }

    let w = width as usize;
    let h = height as usize;
    let luma_len = w * h;
    let mut out = vec![0u8; luma_len + luma_len / 2];

    let (luma, chroma) = out.split_at_mut(luma_len);
    copy_luma(luma, y, w, h)?;
    copy_chroma(chroma, u, v, w / 2, h / 2)?;

    Ok(PackedFrame::from_parts(width, height, Bytes::from(out)))
}

/// Bytes a strided plane must hold to cover `rows x cols` samples.
fn strided_extent(rows: usize, cols: usize, row_stride: usize, pixel_stride: usize) -> usize {
    (rows - 1) * row_stride + (cols - 1) * pixel_stride + 1
}

fn check_strides(
    plane: PlaneKind,
    p: &Plane,
    cols: usize,
    row_stride: usize,
    pixel_stride: usize,
) -> Result<(), ConversionError> {
    if pixel_stride == 0 || row_stride < (cols - 1) * pixel_stride + 1 {
        return Err(ConversionError::InvalidStride {
            plane,
            row_stride: p.row_stride,
            pixel_stride: p.pixel_stride,
        });
    }
    Ok(())
}

fn check_extent(plane: PlaneKind, p: &Plane, needed: usize) -> Result<(), ConversionError> {
    if p.len() < needed {
        return Err(ConversionError::Truncated {
            plane,
            needed,
            available: p.len(),
        });
    }
    Ok(())
}

fn copy_luma(dst: &mut [u8], y: &Plane, w: usize, h: usize) -> Result<(), ConversionError> {
    // Fast path: unpadded plane is already packed.
    if y.row_stride == w && y.pixel_stride == 1 {
        check_extent(PlaneKind::Luma, y, dst.len())?;
        dst.copy_from_slice(&y.data[..dst.len()]);
        return Ok(());
    }

    check_strides(PlaneKind::Luma, y, w, y.row_stride, y.pixel_stride)?;
    check_extent(
        PlaneKind::Luma,
        y,
        strided_extent(h, w, y.row_stride, y.pixel_stride),
    )?;

    for (row, out_row) in dst.chunks_exact_mut(w).enumerate() {
        let base = row * y.row_stride;
        if y.pixel_stride == 1 {
            out_row.copy_from_slice(&y.data[base..base + w]);
        } else {
            for (col, px) in out_row.iter_mut().enumerate() {
                *px = y.data[base + col * y.pixel_stride];
            }
        }
    }
    Ok(())
}

fn copy_chroma(
    dst: &mut [u8],
    u: &Plane,
    v: &Plane,
    cw: usize,
    ch: usize,
) -> Result<(), ConversionError> {
    let row_stride = u.row_stride;
    let pixel_stride = u.pixel_stride;

    if pixel_stride == 2 && row_stride == cw * 2 && shares_backing(u, v) {
        return copy_interleaved(dst, u, v, cw, ch);
    }

    check_strides(PlaneKind::ChromaU, u, cw, row_stride, pixel_stride)?;
    let needed = strided_extent(ch, cw, row_stride, pixel_stride);
    check_extent(PlaneKind::ChromaV, v, needed)?;
    check_extent(PlaneKind::ChromaU, u, needed)?;

    if pixel_stride == 1 {
        // Fully separate planes: walk both rows in lockstep.
        for (row, out_row) in dst.chunks_exact_mut(cw * 2).enumerate() {
            let base = row * row_stride;
            let v_row = &v.data[base..base + cw];
            let u_row = &u.data[base..base + cw];
            for ((pair, &vs), &us) in out_row.chunks_exact_mut(2).zip(v_row).zip(u_row) {
                pair[0] = vs;
                pair[1] = us;
            }
        }
    } else {
        for (row, out_row) in dst.chunks_exact_mut(cw * 2).enumerate() {
            let base = row * row_stride;
            for (col, pair) in out_row.chunks_exact_mut(2).enumerate() {
                let idx = base + col * pixel_stride;
                pair[0] = v.data[idx];
                pair[1] = u.data[idx];
            }
        }
    }
    Ok(())
}

/// The semi-planar layout: V and U are views into one VUVU... buffer, offset
/// by a single byte. Copying from the V view yields packed NV21 directly.
fn copy_interleaved(
    dst: &mut [u8],
    u: &Plane,
    v: &Plane,
    cw: usize,
    ch: usize,
) -> Result<(), ConversionError> {
    let total = dst.len();
    let available = v.len().min(total);

    // HALs commonly end the V view one byte early; the final U sample is then
    // only reachable through the U view.
    if available + 1 < total {
        return Err(ConversionError::Truncated {
            plane: PlaneKind::ChromaV,
            needed: total - 1,
            available: v.len(),
        });
    }
    dst[..available].copy_from_slice(&v.data[..available]);

    if available < total {
        let last_u = (ch - 1) * u.row_stride + (cw - 1) * u.pixel_stride;
        match u.data.get(last_u) {
            Some(&sample) => dst[total - 1] = sample,
            None => {
                return Err(ConversionError::Truncated {
                    plane: PlaneKind::ChromaU,
                    needed: last_u + 1,
                    available: u.len(),
                })
            }
        }
    }
    Ok(())
}

/// True when the two chroma views alias one VUVU buffer, V first. A U-first
/// (NV12) backing takes the element-wise path.
fn shares_backing(u: &Plane, v: &Plane) -> bool {
    let u_ptr = u.data.as_ptr() as usize;
    let v_ptr = v.data.as_ptr() as usize;
    v_ptr.checked_add(1) == Some(u_ptr)
}
