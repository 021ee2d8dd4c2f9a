use ash::vk;

use crate::error::{Result, XferError};

/// First memory type allowed by `type_filter` that has all of `properties`.
///
/// Returns the type index together with the full property set of that type,
/// which may be a superset of what was asked for.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<(u32, vk::MemoryPropertyFlags)> {
    for i in 0..memory_properties.memory_type_count {
        let flags = memory_properties.memory_types[i as usize].property_flags;
        if (type_filter & (1 << i)) != 0 && flags.contains(properties) {
            return Ok((i, flags));
        }
    }
    Err(XferError::NoSuitableMemoryType(properties))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    #[test]
    fn picks_first_allowed_match() {
        let props = table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        let (index, flags) = find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 1);
        assert!(flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));

        let (index, _) = find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn reports_missing_type() {
        let props = table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, XferError::NoSuitableMemoryType(_)));
    }
}
