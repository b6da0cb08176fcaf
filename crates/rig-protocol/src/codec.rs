//! 声明式消息编解码
//!
//! 报文类型 = 有序字段表（宽度 / 符号 / 字节序）+ 数值 type code。
//! 字段是数据而不是手写代码，新增报文类型只需要登记一张字段表，
//! 不需要任何新的打包/解析逻辑。
//!
//! 字段值统一用 `i64` 承载（覆盖所有 ≤8 字节的文档化字段宽度）。

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 字段宽度（字节）
///
/// 只允许协议文档里出现过的四种宽度；配置加载时用
/// `FieldWidth::try_from(u8)` 兜住非法宽度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldWidth {
    W1 = 1,
    W2 = 2,
    W4 = 4,
    W8 = 8,
}

impl FieldWidth {
    pub fn bytes(self) -> usize {
        self as usize
    }
}

/// 字段符号性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// 字段字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

/// 单个字段的声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub width: FieldWidth,
    pub sign: Signedness,
    pub endian: Endianness,
}

impl FieldSpec {
    pub fn new(
        name: impl Into<String>,
        width: FieldWidth,
        sign: Signedness,
        endian: Endianness,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            sign,
            endian,
        }
    }

    /// 无符号 little-endian 字段（最常见的形态）
    pub fn unsigned_le(name: impl Into<String>, width: FieldWidth) -> Self {
        Self::new(name, width, Signedness::Unsigned, Endianness::Little)
    }

    /// 有符号 little-endian 字段
    pub fn signed_le(name: impl Into<String>, width: FieldWidth) -> Self {
        Self::new(name, width, Signedness::Signed, Endianness::Little)
    }

    /// 该字段可表示的取值范围（闭区间）
    fn value_range(&self) -> (i64, i64) {
        let bits = self.width.bytes() as u32 * 8;
        match self.sign {
            Signedness::Unsigned => {
                if bits >= 64 {
                    // u64 上半段放不进 i64，值以 i64 承载时只接受非负部分
                    (0, i64::MAX)
                } else {
                    (0, (1i64 << bits) - 1)
                }
            },
            Signedness::Signed => {
                if bits >= 64 {
                    (i64::MIN, i64::MAX)
                } else {
                    (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
                }
            },
        }
    }
}

/// 消息描述符：命名的字段表 + type code
///
/// 启动时静态构建，运行期只读。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub name: String,
    pub type_code: i16,
    pub fields: Vec<FieldSpec>,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>, type_code: i16, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            type_code,
            fields,
        }
    }

    /// 线上字节数（所有字段宽度之和）
    pub fn wire_size(&self) -> usize {
        self.fields.iter().map(|f| f.width.bytes()).sum()
    }

    /// 按字段表打包
    ///
    /// 值的个数必须与字段数一致，且每个值都要落在对应字段的可表示
    /// 范围内，否则返回 [`CodecError`]（编程错误，快速失败，不重试）。
    pub fn encode(&self, values: &[i64]) -> Result<Vec<u8>, CodecError> {
        if values.len() != self.fields.len() {
            return Err(CodecError::EncodingFieldCount {
                descriptor: self.name.clone(),
                expected: self.fields.len(),
                actual: values.len(),
            });
        }

        let mut out = Vec::with_capacity(self.wire_size());
        for (field, &value) in self.fields.iter().zip(values) {
            let (min, max) = field.value_range();
            if value < min || value > max {
                return Err(CodecError::EncodingRange {
                    descriptor: self.name.clone(),
                    field: field.name.clone(),
                    value,
                    min,
                    max,
                });
            }

            // 补码截断对有符号/无符号同样成立，范围检查已经兜底
            let raw = (value as u64).to_le_bytes();
            let w = field.width.bytes();
            match field.endian {
                Endianness::Little => out.extend_from_slice(&raw[..w]),
                Endianness::Big => out.extend(raw[..w].iter().rev()),
            }
        }
        Ok(out)
    }

    /// 按字段表解包
    ///
    /// 字节长度必须与 [`wire_size`](Self::wire_size) 完全一致。
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<i64>, CodecError> {
        if bytes.len() != self.wire_size() {
            return Err(CodecError::DecodingLength {
                descriptor: self.name.clone(),
                expected: self.wire_size(),
                actual: bytes.len(),
            });
        }

        let mut values = Vec::with_capacity(self.fields.len());
        let mut offset = 0;
        for field in &self.fields {
            let w = field.width.bytes();
            let mut raw = [0u8; 8];
            match field.endian {
                Endianness::Little => raw[..w].copy_from_slice(&bytes[offset..offset + w]),
                Endianness::Big => {
                    for (i, b) in bytes[offset..offset + w].iter().rev().enumerate() {
                        raw[i] = *b;
                    }
                },
            }
            offset += w;

            let unsigned = u64::from_le_bytes(raw);
            let value = match field.sign {
                Signedness::Unsigned => unsigned as i64,
                Signedness::Signed => {
                    let bits = w as u32 * 8;
                    if bits >= 64 {
                        unsigned as i64
                    } else {
                        // 符号扩展
                        let shift = 64 - bits;
                        ((unsigned << shift) as i64) >> shift
                    }
                },
            };
            values.push(value);
        }
        Ok(values)
    }
}

/// 编解码错误类型
///
/// 这些都是调用方的编程错误：立即失败、不重试、不进入重同步路径。
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoding error: `{descriptor}` expects {expected} values, got {actual}")]
    EncodingFieldCount {
        descriptor: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Encoding error: value {value} out of range [{min}, {max}] for field `{field}` of `{descriptor}`"
    )]
    EncodingRange {
        descriptor: String,
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Decoding error: `{descriptor}` expects {expected} bytes, got {actual}")]
    DecodingLength {
        descriptor: String,
        expected: usize,
        actual: usize,
    },

    #[error("Encoding error: frame body length {len} outside [1, {max}]")]
    EncodingBodyLength { len: usize, max: usize },
}
