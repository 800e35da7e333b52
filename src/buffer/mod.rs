//! Structured buffer: a typed layout over a flat `f32` array used as the
//! GPU interchange format.
//!
//! A [`Layout`] maps field names to semantic types and assigns byte offsets
//! respecting per-type alignment; a [`StructuredBuffer`] stores `count`
//! contiguous records of that layout. Two buffers built from the same
//! [`Layout`] are guaranteed byte-identical, which is the contract the host
//! and the device-side kernel accessor both rely on.

use std::collections::HashMap;

/// Semantic field type. Alignment (in `f32` words) follows §4.4: scalars
/// align to 1, 2-vectors to 2, everything wider to 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar,
    IScalar,
    Vec2,
    IVec2,
    Vec3,
    Vec4,
    /// 3x3 matrix, stored as three vec4 rows (the last component of each row
    /// is padding) to keep row alignment uniform.
    Mat3,
}

impl FieldType {
    fn word_align(self) -> usize {
        match self {
            FieldType::Scalar | FieldType::IScalar => 1,
            FieldType::Vec2 | FieldType::IVec2 => 2,
            FieldType::Vec3 | FieldType::Vec4 | FieldType::Mat3 => 4,
        }
    }

    /// Size in `f32`/`i32` words, including row padding for [`FieldType::Vec3`]
    /// (padded to 4) and [`FieldType::Mat3`] (3 rows of 4).
    fn word_size(self) -> usize {
        match self {
            FieldType::Scalar | FieldType::IScalar => 1,
            FieldType::Vec2 | FieldType::IVec2 => 2,
            FieldType::Vec3 | FieldType::Vec4 => 4,
            FieldType::Mat3 => 12,
        }
    }
}

/// A named, typed, offset-assigned field within a [`Layout`].
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub ty: FieldType,
    pub word_offset: usize,
}

/// Describes a struct layout as an ordered name -> semantic-type map, and
/// assigns word offsets honoring each field's alignment.
#[derive(Debug, Clone)]
pub struct Layout {
    fields: HashMap<String, FieldDescriptor>,
    order: Vec<String>,
    stride_words: usize,
}

impl Layout {
    pub fn build(fields: &[(&str, FieldType)]) -> Self {
        let mut cursor = 0usize;
        let mut map = HashMap::with_capacity(fields.len());
        let mut order = Vec::with_capacity(fields.len());

        for &(name, ty) in fields {
            let align = ty.word_align();
            if cursor % align != 0 {
                cursor += align - (cursor % align);
            }
            map.insert(
                name.to_string(),
                FieldDescriptor {
                    ty,
                    word_offset: cursor,
                },
            );
            order.push(name.to_string());
            cursor += ty.word_size();
        }

        // Whole-struct stride padded to a multiple of 4 words.
        let stride_words = cursor.div_ceil(4) * 4;

        Self {
            fields: map,
            order,
            stride_words,
        }
    }

    pub fn stride_words(&self) -> usize {
        self.stride_words
    }

    pub fn field(&self, name: &str) -> Option<FieldDescriptor> {
        self.fields.get(name).copied()
    }

    pub fn field_names(&self) -> &[String] {
        &self.order
    }
}

/// A typed value settable into a [`StructuredBuffer`] field.
#[derive(Debug, Clone, Copy)]
pub enum FieldValue {
    Scalar(f32),
    IScalar(i32),
    Vec2([f32; 2]),
    IVec2([i32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
}

/// Typed, random-access, flat `f32` buffer, indexed by `(record_index, field)`.
///
/// Integer fields are stored bit-reinterpreted via `f32::from_bits`/`to_bits`
/// so the whole buffer is a single homogeneous `Vec<f32>` — the same memory
/// image a device-side kernel accessor binds into.
pub struct StructuredBuffer {
    layout: Layout,
    count: usize,
    data: Vec<f32>,
}

impl StructuredBuffer {
    pub fn new(layout: Layout, count: usize) -> Self {
        let data = vec![0.0; layout.stride_words() * count];
        Self { layout, count, data }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    fn record_offset(&self, index: usize) -> usize {
        index * self.layout.stride_words()
    }

    /// Host-side typed setter by `(index, field, value)`.
    pub fn set(&mut self, index: usize, field: &str, value: FieldValue) {
        let desc = self
            .layout
            .field(field)
            .unwrap_or_else(|| panic!("unknown field `{field}`"));
        let base = self.record_offset(index) + desc.word_offset;
        match (desc.ty, value) {
            (FieldType::Scalar, FieldValue::Scalar(v)) => self.data[base] = v,
            (FieldType::IScalar, FieldValue::IScalar(v)) => self.data[base] = f32::from_bits(v as u32),
            (FieldType::Vec2, FieldValue::Vec2(v)) => self.data[base..base + 2].copy_from_slice(&v),
            (FieldType::IVec2, FieldValue::IVec2(v)) => {
                self.data[base] = f32::from_bits(v[0] as u32);
                self.data[base + 1] = f32::from_bits(v[1] as u32);
            }
            (FieldType::Vec3, FieldValue::Vec3(v)) => self.data[base..base + 3].copy_from_slice(&v),
            (FieldType::Vec4, FieldValue::Vec4(v)) => self.data[base..base + 4].copy_from_slice(&v),
            (FieldType::Mat3, FieldValue::Mat3(v)) => {
                for row in 0..3 {
                    self.data[base + row * 4..base + row * 4 + 3]
                        .copy_from_slice(&v[row * 3..row * 3 + 3]);
                }
            }
            _ => panic!("field `{field}` type mismatch"),
        }
    }

    /// Host-side typed getter, mirroring [`StructuredBuffer::set`].
    pub fn get(&self, index: usize, field: &str) -> FieldValue {
        let desc = self
            .layout
            .field(field)
            .unwrap_or_else(|| panic!("unknown field `{field}`"));
        let base = self.record_offset(index) + desc.word_offset;
        match desc.ty {
            FieldType::Scalar => FieldValue::Scalar(self.data[base]),
            FieldType::IScalar => FieldValue::IScalar(self.data[base].to_bits() as i32),
            FieldType::Vec2 => FieldValue::Vec2([self.data[base], self.data[base + 1]]),
            FieldType::IVec2 => FieldValue::IVec2([
                self.data[base].to_bits() as i32,
                self.data[base + 1].to_bits() as i32,
            ]),
            FieldType::Vec3 => FieldValue::Vec3([
                self.data[base],
                self.data[base + 1],
                self.data[base + 2],
            ]),
            FieldType::Vec4 => FieldValue::Vec4([
                self.data[base],
                self.data[base + 1],
                self.data[base + 2],
                self.data[base + 3],
            ]),
            FieldType::Mat3 => {
                let mut m = [0.0; 9];
                for row in 0..3 {
                    m[row * 3..row * 3 + 3]
                        .copy_from_slice(&self.data[base + row * 4..base + row * 4 + 3]);
                }
                FieldValue::Mat3(m)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_respects_alignment_and_stride() {
        let layout = Layout::build(&[
            ("flag", FieldType::IScalar),
            ("position", FieldType::Vec3),
            ("mass", FieldType::Scalar),
        ]);
        assert_eq!(layout.field("flag").unwrap().word_offset, 0);
        // vec3 needs align 4, flag took 1 word -> padded to 4.
        assert_eq!(layout.field("position").unwrap().word_offset, 4);
        assert_eq!(layout.field("mass").unwrap().word_offset, 8);
        assert_eq!(layout.stride_words(), 12);
    }

    #[test]
    fn two_identical_layouts_produce_byte_identical_images() {
        let build = || Layout::build(&[("position", FieldType::Vec3), ("mass", FieldType::Scalar)]);
        let mut a = StructuredBuffer::new(build(), 1);
        let mut b = StructuredBuffer::new(build(), 1);
        a.set(0, "position", FieldValue::Vec3([1.0, 2.0, 3.0]));
        a.set(0, "mass", FieldValue::Scalar(0.5));
        b.set(0, "position", FieldValue::Vec3([1.0, 2.0, 3.0]));
        b.set(0, "mass", FieldValue::Scalar(0.5));
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn round_trips_through_set_get() {
        let layout = Layout::build(&[("id", FieldType::IScalar)]);
        let mut buf = StructuredBuffer::new(layout, 2);
        buf.set(1, "id", FieldValue::IScalar(-7));
        match buf.get(1, "id") {
            FieldValue::IScalar(v) => assert_eq!(v, -7),
            _ => panic!("wrong variant"),
        }
    }
}
