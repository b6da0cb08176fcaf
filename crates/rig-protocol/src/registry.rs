//! 静态消息分发表
//!
//! 显式的 `{type_code -> MessageDescriptor}` 表，启动时一次性构建，
//! 取代原实现里"扫描已加载模块属性"的反射式注册。
//!
//! type code 冲突是硬性的启动错误：旧实现会静默让后注册者获胜，
//! 这里把这个隐患当作 [`RegistryError::DuplicateTypeCode`] 直接拒绝。

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec::{CodecError, MessageDescriptor};

/// 解码完成、可交给业务层的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// 描述符名
    pub name: String,
    /// 帧头 format_id（即 type code）
    pub type_code: i16,
    /// 按字段声明顺序的值
    pub values: Vec<i64>,
}

/// 注册表错误
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(
        "Duplicate type code {code}: `{existing}` already registered, refusing to add `{incoming}`"
    )]
    DuplicateTypeCode {
        code: i16,
        existing: String,
        incoming: String,
    },

    #[error("Unknown type code: {code}")]
    UnknownTypeCode { code: i16 },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// `{type_code -> MessageDescriptor}` 静态表
#[derive(Debug, Clone, Default)]
pub struct MessageRegistry {
    by_code: BTreeMap<i16, MessageDescriptor>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 一次性从描述符列表装配；任何冲突都让装配失败
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = MessageDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for d in descriptors {
            registry.register(d)?;
        }
        Ok(registry)
    }

    /// 登记一个描述符；type code 冲突返回错误，绝不静默覆盖
    pub fn register(&mut self, descriptor: MessageDescriptor) -> Result<(), RegistryError> {
        if let Some(existing) = self.by_code.get(&descriptor.type_code) {
            return Err(RegistryError::DuplicateTypeCode {
                code: descriptor.type_code,
                existing: existing.name.clone(),
                incoming: descriptor.name,
            });
        }
        self.by_code.insert(descriptor.type_code, descriptor);
        Ok(())
    }

    pub fn get(&self, type_code: i16) -> Option<&MessageDescriptor> {
        self.by_code.get(&type_code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// 按 type code 解码消息体
    pub fn decode(&self, type_code: i16, body: &[u8]) -> Result<DecodedMessage, RegistryError> {
        let descriptor = self
            .get(type_code)
            .ok_or(RegistryError::UnknownTypeCode { code: type_code })?;
        let values = descriptor.decode(body)?;
        Ok(DecodedMessage {
            name: descriptor.name.clone(),
            type_code,
            values,
        })
    }

    /// 按 type code 编码消息体
    pub fn encode(&self, type_code: i16, values: &[i64]) -> Result<Vec<u8>, RegistryError> {
        let descriptor = self
            .get(type_code)
            .ok_or(RegistryError::UnknownTypeCode { code: type_code })?;
        Ok(descriptor.encode(values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FieldSpec, FieldWidth};

    fn descriptor(name: &str, code: i16) -> MessageDescriptor {
        MessageDescriptor::new(
            name,
            code,
            vec![
                FieldSpec::unsigned_le("command", FieldWidth::W1),
                FieldSpec::signed_le("value", FieldWidth::W2),
            ],
        )
    }

    #[test]
    fn test_register_and_dispatch() {
        let registry = MessageRegistry::from_descriptors([
            descriptor("TurntableMove", 0x0010),
            descriptor("TurntableStatus", -0x0010),
        ])
        .unwrap();
        assert_eq!(registry.len(), 2);

        let body = registry.encode(0x0010, &[0x02, -450]).unwrap();
        let msg = registry.decode(0x0010, &body).unwrap();
        assert_eq!(msg.name, "TurntableMove");
        assert_eq!(msg.values, vec![0x02, -450]);

        // 负 type code 也是合法的分发键
        assert!(registry.get(-0x0010).is_some());
    }

    #[test]
    fn test_duplicate_type_code_is_hard_error() {
        let err = MessageRegistry::from_descriptors([
            descriptor("First", 0x0010),
            descriptor("Second", 0x0010),
        ])
        .unwrap_err();

        match err {
            RegistryError::DuplicateTypeCode {
                code,
                existing,
                incoming,
            } => {
                assert_eq!(code, 0x0010);
                assert_eq!(existing, "First");
                assert_eq!(incoming, "Second");
            },
            other => panic!("expected DuplicateTypeCode, got {other}"),
        }
    }

    #[test]
    fn test_unknown_type_code() {
        let registry = MessageRegistry::new();
        assert!(matches!(
            registry.decode(0x7777, &[]),
            Err(RegistryError::UnknownTypeCode { code: 0x7777 })
        ));
        assert!(matches!(
            registry.encode(0x7777, &[]),
            Err(RegistryError::UnknownTypeCode { code: 0x7777 })
        ));
    }

    #[test]
    fn test_decode_propagates_codec_error() {
        let registry = MessageRegistry::from_descriptors([descriptor("M", 1)]).unwrap();
        assert!(matches!(
            registry.decode(1, &[0u8; 2]),
            Err(RegistryError::Codec(CodecError::DecodingLength { .. }))
        ));
    }
}
