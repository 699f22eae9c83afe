use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

/// Resource quantities for nodes and pods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    /// CPU in millicores (1000 = 1 core)
    pub cpu_millicores: i64,
    /// Memory in bytes
    pub memory_bytes: i64,
}

impl ResourceQuantities {
    pub fn new(cpu_millicores: i64, memory_bytes: i64) -> Self {
        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    /// Parse CPU string (e.g., "2", "1000m", "0.5")
    pub fn parse_cpu(s: &str) -> Result<i64, String> {
        if let Some(m) = s.strip_suffix('m') {
            // Millicores
            m.parse::<i64>()
                .map_err(|e| format!("Invalid CPU millicore value: {}", e))
        } else if let Ok(cores) = s.parse::<f64>() {
            Ok((cores * 1000.0) as i64)
        } else {
            Err(format!("Invalid CPU format: {}", s))
        }
    }

    /// Parse memory string (e.g., "128Mi", "1Gi", "1024")
    ///
    /// Values that do not fit in an `i64` byte count are rejected.
    pub fn parse_memory(s: &str) -> Result<i64, String> {
        let (num, multiplier) = if let Some(num) = s.strip_suffix("Ki") {
            (num, 1024)
        } else if let Some(num) = s.strip_suffix("Mi") {
            (num, 1024 * 1024)
        } else if let Some(num) = s.strip_suffix("Gi") {
            (num, 1024 * 1024 * 1024)
        } else {
            // Plain bytes
            (s, 1)
        };

        num.parse::<i64>()
            .map_err(|e| e.to_string())?
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Memory value out of range: {}", s))
    }

    /// Get CPU and memory from a resource map (k8s-openapi format)
    ///
    /// Unparseable quantities count as zero.
    pub fn from_k8s_resource_map(resources: &BTreeMap<String, Quantity>) -> Self {
        let cpu_millicores = resources
            .get("cpu")
            .and_then(|q| Self::parse_cpu(&q.0).ok())
            .unwrap_or(0);

        let memory_bytes = resources
            .get("memory")
            .and_then(|q| Self::parse_memory(&q.0).ok())
            .unwrap_or(0);

        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.cpu_millicores == 0 && self.memory_bytes == 0
    }
}

impl Add for ResourceQuantities {
    type Output = Self;

    /// Saturates at `i64::MAX` instead of overflowing
    fn add(self, rhs: Self) -> Self {
        Self {
            cpu_millicores: self.cpu_millicores.saturating_add(rhs.cpu_millicores),
            memory_bytes: self.memory_bytes.saturating_add(rhs.memory_bytes),
        }
    }
}

impl AddAssign for ResourceQuantities {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu() {
        assert_eq!(ResourceQuantities::parse_cpu("1").unwrap(), 1000);
        assert_eq!(ResourceQuantities::parse_cpu("0.5").unwrap(), 500);
        assert_eq!(ResourceQuantities::parse_cpu("100m").unwrap(), 100);
        assert_eq!(ResourceQuantities::parse_cpu("2").unwrap(), 2000);
        assert!(ResourceQuantities::parse_cpu("lots").is_err());
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(ResourceQuantities::parse_memory("1024").unwrap(), 1024);
        assert_eq!(ResourceQuantities::parse_memory("1Ki").unwrap(), 1024);
        assert_eq!(
            ResourceQuantities::parse_memory("128Mi").unwrap(),
            128 * 1024 * 1024
        );
        assert_eq!(
            ResourceQuantities::parse_memory("1Gi").unwrap(),
            1024 * 1024 * 1024
        );
    }

    #[test]
    fn test_from_k8s_resource_map() {
        let mut map = BTreeMap::new();
        map.insert("cpu".to_string(), Quantity("250m".to_string()));
        map.insert("memory".to_string(), Quantity("64Mi".to_string()));

        let q = ResourceQuantities::from_k8s_resource_map(&map);
        assert_eq!(q, ResourceQuantities::new(250, 64 * 1024 * 1024));
    }

    #[test]
    fn test_add_quantities() {
        let mut total = ResourceQuantities::default();
        assert!(total.is_zero());
        total += ResourceQuantities::new(500, 1024);
        total += ResourceQuantities::new(250, 1024);
        assert_eq!(total, ResourceQuantities::new(750, 2048));
    }

    #[test]
    fn test_parse_memory_rejects_overflow() {
        assert!(ResourceQuantities::parse_memory("9999999999999Gi").is_err());
        assert!(ResourceQuantities::parse_memory("9223372036854775807Ki").is_err());
        assert_eq!(
            ResourceQuantities::parse_memory("8Gi").unwrap(),
            8 * 1024 * 1024 * 1024
        );

        let mut map = BTreeMap::new();
        map.insert("cpu".to_string(), Quantity("1".to_string()));
        map.insert("memory".to_string(), Quantity("9999999999999Gi".to_string()));
        let q = ResourceQuantities::from_k8s_resource_map(&map);
        assert_eq!(q, ResourceQuantities::new(1000, 0));
    }

    #[test]
    fn test_add_saturates() {
        let big = ResourceQuantities::new(i64::MAX - 1, 6_000_000_000_000_000_000);
        let total = big + big;
        assert_eq!(total, ResourceQuantities::new(i64::MAX, i64::MAX));

        let mut acc = ResourceQuantities::new(1, 1);
        acc += ResourceQuantities::new(i64::MAX, i64::MAX);
        assert_eq!(acc, ResourceQuantities::new(i64::MAX, i64::MAX));
    }
}
