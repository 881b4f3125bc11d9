//! Method descriptor parsing.
//!
//! Only what the analysis needs: how many arguments a call consumes, how many
//! frame slots each parameter occupies, and whether anything is returned.

/// Parsed form of a descriptor such as `(IJLjava/lang/String;)V`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Frame width of each parameter, in declaration order (2 for `J`/`D`)
    pub parameter_widths: Vec<u16>,
    pub return_type: String,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Option<Self> {
        let rest = descriptor.strip_prefix('(')?;
        let close = rest.find(')')?;
        let (params, ret) = rest.split_at(close);
        let return_type = &ret[1..];
        if return_type.is_empty() {
            return None;
        }

        let mut parameter_widths = Vec::new();
        let mut chars = params.chars().peekable();
        while let Some(c) = chars.next() {
            let width = match c {
                'J' | 'D' => 2,
                'B' | 'C' | 'F' | 'I' | 'S' | 'Z' => 1,
                'L' => {
                    chars.by_ref().find(|&c| c == ';')?;
                    1
                }
                '[' => {
                    while chars.peek() == Some(&'[') {
                        chars.next();
                    }
                    match chars.next()? {
                        'L' => {
                            chars.by_ref().find(|&c| c == ';')?;
                        }
                        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => {}
                        _ => return None,
                    }
                    1
                }
                _ => return None,
            };
            parameter_widths.push(width);
        }

        Some(Self {
            parameter_widths,
            return_type: return_type.to_string(),
        })
    }

    pub fn argument_count(&self) -> usize {
        self.parameter_widths.len()
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == "V"
    }

    /// Slots holding parameters, starting after the receiver when there is one.
    pub fn parameter_slots(&self, has_receiver: bool) -> Vec<u16> {
        let mut next = u16::from(has_receiver);
        self.parameter_widths
            .iter()
            .map(|width| {
                let slot = next;
                next += width;
                slot
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_parameters() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/String;[[DZ)V").unwrap();
        assert_eq!(desc.parameter_widths, vec![1, 2, 1, 1, 1]);
        assert!(desc.returns_void());
        assert_eq!(desc.argument_count(), 5);
    }

    #[test]
    fn test_parameter_slots_skip_receiver_and_wide_values() {
        let desc = MethodDescriptor::parse("(JI)Ljava/lang/Object;").unwrap();
        assert_eq!(desc.parameter_slots(true), vec![1, 3]);
        assert_eq!(desc.parameter_slots(false), vec![0, 2]);
        assert!(!desc.returns_void());
    }

    #[test]
    fn test_rejects_malformed_descriptors() {
        assert_eq!(MethodDescriptor::parse("I)V"), None);
        assert_eq!(MethodDescriptor::parse("(Ljava/lang/String)V"), None);
        assert_eq!(MethodDescriptor::parse("(Q)V"), None);
        assert_eq!(MethodDescriptor::parse("()"), None);
    }
}
