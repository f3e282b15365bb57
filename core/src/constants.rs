use alloy::primitives::{Address, address};

pub const ENTRYPOINT_ADDRESS_V0_7: Address =
    address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

pub const DEFAULT_FACTORY_ADDRESS: Address =
    address!("0xaac5D4240AF87249B3f71BC8E4A2cae074A3E419");

pub const DEFAULT_IMPLEMENTATION_ADDRESS: Address =
    address!("0xBAC849bB641841b44E965fB01A4Bf5F074f84b4D");
