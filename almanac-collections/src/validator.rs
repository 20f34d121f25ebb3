use almanac_ical::filter::Filter;
use almanac_ical::{ObjectInfo, ObjectModel};

use crate::error::Result;

/// Evaluates filters on raw calendar data through an [`ObjectModel`].
///
/// Parse failures come out as `Error::MalformedObject`, scanning callers
/// decide whether to skip the object or to fail.
pub struct FilterValidator<'a> {
    model: &'a dyn ObjectModel,
}

impl<'a> FilterValidator<'a> {
    pub fn new(model: &'a dyn ObjectModel) -> Self {
        Self { model }
    }

    pub fn validate(&self, raw: &[u8], filter: &Filter) -> Result<bool> {
        Ok(self.model.matches(raw, filter)?)
    }

    pub fn inspect(&self, raw: &[u8]) -> Result<ObjectInfo> {
        Ok(self.model.inspect(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use almanac_ical::filter::Component;
    use almanac_ical::IcalModel;

    #[test]
    fn malformed_data() {
        let validator = FilterValidator::new(&IcalModel);
        let res = validator.validate(&[0xc3, 0x28], &Filter::component(Component::VEvent));
        assert!(matches!(res, Err(Error::MalformedObject(_))));
    }

    #[test]
    fn match_and_no_match() {
        let validator = FilterValidator::new(&IcalModel);
        let raw = b"BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:t1\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        assert!(validator
            .validate(raw, &Filter::component(Component::VTodo))
            .unwrap());
        assert!(!validator
            .validate(raw, &Filter::component(Component::VEvent))
            .unwrap());
    }
}
