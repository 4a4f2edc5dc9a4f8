use conv_bytecode::DataType;

/// Parameter layout of an intrinsic whose signature is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterInfo {
    pub types: &'static [DataType],
    /// Which parameters point at a zero-terminated array.
    pub arrays: &'static [bool],
}

impl ParameterInfo {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Parameter layout of the intrinsic `name`, if known.
pub fn parameter_info(name: &str) -> Option<ParameterInfo> {
    use DataType::{Int, String};

    let (types, arrays): (&'static [DataType], &'static [bool]) = match name {
        "babl_menu" => (&[String], &[true]),
        "babl_fmenu" => (&[String, Int], &[true, true]),
        "length" => (&[String], &[false]),
        "compare" | "contains" | "sex" => (&[String, String], &[false, false]),
        "print" => (&[String], &[false]),
        _ => return None,
    };
    Some(ParameterInfo { types, arrays })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_intrinsics_take_arrays() {
        let info = parameter_info("babl_fmenu").unwrap();
        assert_eq!(info.types, &[DataType::String, DataType::Int]);
        assert!(info.arrays.iter().all(|array| *array));
        assert_eq!(parameter_info("contains").map(|info| info.len()), Some(2));
        assert!(parameter_info("get_quest").is_none());
    }
}
