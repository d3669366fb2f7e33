use tallybook_core::CompanyId;

use crate::EventEnvelope;

/// Messages that belong to exactly one company.
///
/// Workers use this to stay pinned to a single company when configured to.
pub trait CompanyScoped {
    fn company_id(&self) -> CompanyId;
}

impl<E> CompanyScoped for EventEnvelope<E> {
    fn company_id(&self) -> CompanyId {
        EventEnvelope::company_id(self)
    }
}
