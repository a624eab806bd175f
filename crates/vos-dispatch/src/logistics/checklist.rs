use super::domain::{ChecklistItem, Stop};
use super::status::StopType;

const PICKUP_ITEMS: &[&str] = &[
    "Verify vehicle VIN matches paperwork",
    "Inspect vehicle for existing damage",
    "Take vehicle condition photos",
    "Collect all required paperwork",
    "Verify pickup location matches order",
    "Confirm contact person and obtain signature",
    "Secure vehicle on truck properly",
    "Complete Bill of Lading",
];

const DROP_ITEMS: &[&str] = &[
    "Verify delivery location matches order",
    "Inspect vehicle for damage during transport",
    "Take delivery condition photos",
    "Obtain delivery confirmation signature",
    "Complete delivery paperwork",
    "Unload vehicle safely",
    "Verify contact person identity",
    "Confirm all paperwork is complete",
];

const BREAK_ITEMS: &[&str] = &[
    "Park truck in safe location",
    "Set parking brake",
    "Secure vehicle load",
    "Verify truck and trailer are secure",
];

const REST_ITEMS: &[&str] = &[
    "Park truck in designated rest area",
    "Set parking brake",
    "Secure vehicle load",
    "Lock truck and trailer",
    "Verify truck and trailer are secure",
];

/// Default checklist a driver works through at a stop of the given type.
pub fn default_checklist(stop_type: StopType) -> Vec<ChecklistItem> {
    let items = match stop_type {
        StopType::Pickup => PICKUP_ITEMS,
        StopType::Drop => DROP_ITEMS,
        StopType::Break => BREAK_ITEMS,
        StopType::Rest => REST_ITEMS,
    };
    items.iter().copied().map(ChecklistItem::unchecked).collect()
}

/// Fill in the default checklist when the caller supplied none.
pub fn ensure_checklist(stop: &mut Stop) {
    if stop.checklist.is_empty() {
        stop.checklist = default_checklist(stop.stop_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stop_type() {
        assert_eq!(default_checklist(StopType::Pickup).len(), 8);
        assert_eq!(default_checklist(StopType::Drop).len(), 8);
        assert_eq!(default_checklist(StopType::Break).len(), 4);
        assert_eq!(default_checklist(StopType::Rest).len(), 5);
        assert!(default_checklist(StopType::Drop)
            .iter()
            .all(|item| !item.checked && item.completed_at.is_none()));
    }

    #[test]
    fn keeps_caller_supplied_checklist() {
        let mut stop = Stop::new(StopType::Rest, None, 1);
        stop.checklist = vec![ChecklistItem::unchecked("Refuel")];
        ensure_checklist(&mut stop);
        assert_eq!(stop.checklist.len(), 1);

        let mut bare = Stop::new(StopType::Pickup, None, 2);
        ensure_checklist(&mut bare);
        assert_eq!(bare.checklist[0].item, "Verify vehicle VIN matches paperwork");
    }
}
