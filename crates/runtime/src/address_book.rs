use dashmap::DashSet;

/// Addresses that have an actor behind them, plus the aggregation address.
#[derive(Debug)]
pub struct AddressBook {
    aggregation: String,
    known: DashSet<String>,
}

impl AddressBook {
    pub fn new(aggregation: impl Into<String>) -> Self {
        Self {
            aggregation: aggregation.into(),
            known: DashSet::new(),
        }
    }

    pub fn with_addresses<I, S>(aggregation: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let book = Self::new(aggregation);
        for address in addresses {
            book.register(address);
        }
        book
    }

    pub fn aggregation(&self) -> &str {
        &self.aggregation
    }

    /// Returns `false` if the address was already known.
    pub fn register(&self, address: impl Into<String>) -> bool {
        self.known.insert(address.into())
    }

    pub fn contains(&self, address: &str) -> bool {
        address == self.aggregation || self.known.contains(address)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
