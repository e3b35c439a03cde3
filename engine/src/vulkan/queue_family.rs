use std::collections::BTreeSet;
use std::fmt;

use anyhow::{anyhow, Result};
use vulkanalia::vk::{self, InstanceV1_0, KhrSurfaceExtension};

use super::device::SuitabilityError;
use super::instance::VulkanInstance;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueueRole {
    Graphics = 0,
    Present = 1,
    Transfer = 2,
}

impl QueueRole {
    pub const COUNT: usize = 3;
    pub const ALL: [QueueRole; QueueRole::COUNT] =
        [QueueRole::Graphics, QueueRole::Present, QueueRole::Transfer];
}

/// Queue family index per [`QueueRole`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    indices: [Option<u32>; QueueRole::COUNT],
}

impl QueueFamilyIndices {
    pub unsafe fn query(
        instance: &VulkanInstance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let properties = instance
            .vk_instance
            .get_physical_device_queue_family_properties(physical_device);

        let indices = QueueFamilyIndices::find(&properties, |index| {
            Ok(instance.vk_instance.get_physical_device_surface_support_khr(
                physical_device,
                index,
                surface,
            )?)
        })?;

        if indices.is_complete() {
            Ok(indices)
        } else {
            Err(anyhow!(SuitabilityError("required queue families")))
        }
    }

    /// Scans `families` once. The first family with graphics support takes the
    /// graphics role, the first family with transfer but no graphics support
    /// takes the transfer role, and the first family that can present to the
    /// surface takes the present role. Transfer falls back to graphics.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut indices = QueueFamilyIndices::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let flags = family.queue_flags;

            if indices.get(QueueRole::Graphics).is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.set(QueueRole::Graphics, index);
            }

            if indices.get(QueueRole::Transfer).is_none()
                && flags.contains(vk::QueueFlags::TRANSFER)
                && !flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.set(QueueRole::Transfer, index);
            }

            if indices.get(QueueRole::Present).is_none() && supports_present(index)? {
                indices.set(QueueRole::Present, index);
            }

            if indices.is_complete() {
                break;
            }
        }

        if let (None, Some(graphics)) = (indices.get(QueueRole::Transfer), indices.get(QueueRole::Graphics)) {
            indices.set(QueueRole::Transfer, graphics);
        }

        Ok(indices)
    }

    pub fn get(&self, role: QueueRole) -> Option<u32> {
        self.indices[role as usize]
    }

    pub fn set(&mut self, role: QueueRole, index: u32) {
        self.indices[role as usize] = Some(index);
    }

    /// Index for `role`. Only valid on complete indices.
    pub fn index(&self, role: QueueRole) -> u32 {
        self.indices[role as usize].unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.indices.iter().all(Option::is_some)
    }

    pub fn unique_indices(&self) -> BTreeSet<u32> {
        self.indices.iter().flatten().copied().collect()
    }

    pub fn all_same(&self) -> bool {
        self.unique_indices().len() == 1
    }

    pub fn separate_transfer_queue(&self) -> bool {
        self.get(QueueRole::Transfer) != self.get(QueueRole::Graphics)
    }

    /// Families that share resources touched by graphics and present.
    pub fn graphics_present(&self) -> Vec<u32> {
        [QueueRole::Graphics, QueueRole::Present]
            .iter()
            .filter_map(|r| self.get(*r))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Families that share resources touched by graphics and transfer.
    pub fn graphics_transfer(&self) -> Vec<u32> {
        [QueueRole::Graphics, QueueRole::Transfer]
            .iter()
            .filter_map(|r| self.get(*r))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl fmt::Display for QueueFamilyIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |index: Option<u32>| index.map_or("-".to_string(), |i| i.to_string());
        write!(
            f,
            "graphics: {}, present: {}, transfer: {}",
            show(self.get(QueueRole::Graphics)),
            show(self.get(QueueRole::Present)),
            show(self.get(QueueRole::Transfer)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn indices(graphics: Option<u32>, present: Option<u32>, transfer: Option<u32>) -> QueueFamilyIndices {
        QueueFamilyIndices {
            indices: [graphics, present, transfer],
        }
    }

    fn universal() -> vk::QueueFamilyProperties {
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
    }

    fn transfer() -> vk::QueueFamilyProperties {
        family(vk::QueueFlags::TRANSFER)
    }

    #[test]
    fn test_single_universal_family() {
        let found = QueueFamilyIndices::find(&[universal()], |_| Ok(true)).unwrap();

        assert!(found.is_complete());
        assert!(found.all_same());
        assert!(!found.separate_transfer_queue());
        assert_eq!(found.unique_indices().into_iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_dedicated_transfer_family() {
        let families = [universal(), family(vk::QueueFlags::COMPUTE), transfer()];
        let found = QueueFamilyIndices::find(&families, |i| Ok(i == 0)).unwrap();

        assert_eq!(found, indices(Some(0), Some(0), Some(2)));
        assert!(found.separate_transfer_queue());
        assert_eq!(found.graphics_transfer(), vec![0, 2]);
        assert_eq!(found.graphics_present(), vec![0]);
    }

    #[test]
    fn test_first_matching_family_wins() {
        let families = [transfer(), universal(), universal(), transfer()];
        let found = QueueFamilyIndices::find(&families, |i| Ok(i >= 1)).unwrap();

        assert_eq!(found, indices(Some(1), Some(1), Some(0)));
    }

    #[test]
    fn test_separate_present_family() {
        let families = [universal(), universal()];
        let found = QueueFamilyIndices::find(&families, |i| Ok(i == 1)).unwrap();

        assert_eq!(found, indices(Some(0), Some(1), Some(0)));
        assert!(!found.all_same());
        assert_eq!(found.graphics_present(), vec![0, 1]);
        assert_eq!(found.unique_indices().len(), 2);
    }

    #[test]
    fn test_scan_stops_when_complete() {
        let families = [universal(), transfer(), universal()];
        let mut queried = vec![];
        QueueFamilyIndices::find(&families, |i| {
            queried.push(i);
            Ok(i == 1)
        })
        .unwrap();

        assert_eq!(queried, vec![0, 1]);
    }

    #[test]
    fn test_no_present_support_is_incomplete() {
        let found = QueueFamilyIndices::find(&[universal()], |_| Ok(false)).unwrap();
        assert!(!found.is_complete());
        assert_eq!(found.get(QueueRole::Transfer), Some(0));
    }

    #[test]
    fn test_no_graphics_has_no_transfer_fallback() {
        let found = QueueFamilyIndices::find(&[family(vk::QueueFlags::COMPUTE)], |_| Ok(true)).unwrap();
        assert!(!found.is_complete());
        assert_eq!(found.get(QueueRole::Transfer), None);
    }

    #[test]
    fn test_surface_query_error_propagates() {
        let result = QueueFamilyIndices::find(&[universal()], |_| Err(anyhow!("surface lost")));
        assert!(result.is_err());
    }

    #[test]
    fn test_complete_requires_every_role() {
        assert!(!QueueFamilyIndices::default().is_complete());
        assert!(!indices(Some(0), None, Some(0)).is_complete());
        assert!(indices(Some(0), Some(0), Some(0)).is_complete());
    }

    #[test]
    fn test_unique_indices_have_no_duplicates() {
        let cases = [
            indices(Some(0), Some(0), Some(0)),
            indices(Some(0), Some(1), Some(0)),
            indices(Some(2), Some(1), Some(2)),
            indices(Some(0), Some(1), Some(2)),
        ];
        for case in cases {
            let unique = case.unique_indices();
            let mut all = QueueRole::ALL.iter().map(|r| case.index(*r)).collect::<Vec<_>>();
            all.sort();
            all.dedup();
            assert_eq!(unique.into_iter().collect::<Vec<_>>(), all);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            indices(Some(0), Some(1), None).to_string(),
            "graphics: 0, present: 1, transfer: -"
        );
    }
}
