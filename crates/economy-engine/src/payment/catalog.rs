//! 提示包目录

use quiz_shared::config::PackConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, Result};

/// 可购买的提示包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintPack {
    pub key: String,
    pub name: String,
    pub quantity: i64,
    /// 价格（最小货币单位）
    pub unit_amount: i64,
}

impl HintPack {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        quantity: i64,
        unit_amount: i64,
    ) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(EconomyError::Validation("提示包 key 不能为空".to_string()));
        }
        if quantity <= 0 {
            return Err(EconomyError::Validation(format!(
                "提示包 {} 的数量必须为正",
                key
            )));
        }
        if unit_amount < 0 {
            return Err(EconomyError::Validation(format!(
                "提示包 {} 的价格不能为负",
                key
            )));
        }
        Ok(Self {
            key,
            name: name.into(),
            quantity,
            unit_amount,
        })
    }
}

/// 提示包目录，下单时只接受目录内的 key
#[derive(Debug, Clone)]
pub struct PackCatalog {
    packs: Vec<HintPack>,
}

impl Default for PackCatalog {
    fn default() -> Self {
        Self {
            packs: vec![
                HintPack {
                    key: "hints_10".to_string(),
                    name: "10 Hints".to_string(),
                    quantity: 10,
                    unit_amount: 199,
                },
                HintPack {
                    key: "hints_50".to_string(),
                    name: "50 Hints".to_string(),
                    quantity: 50,
                    unit_amount: 799,
                },
                HintPack {
                    key: "hints_120".to_string(),
                    name: "120 Hints".to_string(),
                    quantity: 120,
                    unit_amount: 1499,
                },
            ],
        }
    }
}

impl PackCatalog {
    pub fn new(packs: Vec<HintPack>) -> Result<Self> {
        let mut keys = std::collections::HashSet::new();
        for pack in &packs {
            if !keys.insert(pack.key.as_str()) {
                return Err(EconomyError::Validation(format!(
                    "提示包 key 重复: {}",
                    pack.key
                )));
            }
        }
        Ok(Self { packs })
    }

    /// 由配置构造，配置为空时使用内置目录
    pub fn from_config(packs: &[PackConfig]) -> Result<Self> {
        if packs.is_empty() {
            return Ok(Self::default());
        }
        let packs = packs
            .iter()
            .map(|p| HintPack::new(&p.key, &p.name, p.quantity, p.unit_amount))
            .collect::<Result<Vec<_>>>()?;
        Self::new(packs)
    }

    pub fn get(&self, key: &str) -> Result<&HintPack> {
        self.packs
            .iter()
            .find(|p| p.key == key)
            .ok_or_else(|| EconomyError::InvalidPackKey(key.to_string()))
    }

    pub fn packs(&self) -> &[HintPack] {
        &self.packs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = PackCatalog::default();
        assert_eq!(catalog.get("hints_50").unwrap().quantity, 50);
        assert!(matches!(
            catalog.get("hints_9999"),
            Err(EconomyError::InvalidPackKey(_))
        ));
    }

    #[test]
    fn test_pack_validation() {
        assert!(HintPack::new("p", "P", 0, 100).is_err());
        assert!(HintPack::new("p", "P", 5, -1).is_err());
        assert!(HintPack::new("", "P", 5, 100).is_err());
        assert!(HintPack::new("p", "P", 5, 100).is_ok());
    }

    #[test]
    fn test_from_config() {
        let catalog = PackCatalog::from_config(&[PackConfig {
            key: "starter".to_string(),
            name: "Starter".to_string(),
            quantity: 5,
            unit_amount: 99,
        }])
        .unwrap();
        assert_eq!(catalog.packs().len(), 1);
        assert!(catalog.get("hints_10").is_err());

        assert_eq!(PackCatalog::from_config(&[]).unwrap().packs().len(), 3);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let pack = HintPack::new("p", "P", 5, 100).unwrap();
        assert!(PackCatalog::new(vec![pack.clone(), pack]).is_err());
    }
}
