//! UPC fixtures for E2E testing against the live lookup service

/// A UPC with what the live service is expected to report for it.
#[derive(Debug, Clone)]
pub struct UpcFixture {
    pub upc: &'static str,
    pub expected_brand: &'static str,
    /// Whether the upstream database is expected to know this UPC.
    pub should_resolve: bool,
    pub description: &'static str,
}

pub const UPC_FIXTURES: &[UpcFixture] = &[
    UpcFixture {
        upc: "885909950805",
        expected_brand: "Apple",
        should_resolve: true,
        description: "Apple iPhone, several product images",
    },
    UpcFixture {
        upc: "4002293401102",
        expected_brand: "Faber-Castell",
        should_resolve: true,
        description: "Stationery item, EAN-13",
    },
    UpcFixture {
        upc: "000000000000",
        expected_brand: "",
        should_resolve: false,
        description: "All-zero UPC, unknown upstream",
    },
];
