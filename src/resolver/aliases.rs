//! Static alias seed table
//!
//! Human names (Turkish and English spellings, with and without diacritics)
//! mapped to the market-data identifiers the quote provider understands.

pub const SEED_ALIASES: &[(&str, &str)] = &[
    // Commodities
    ("altın", "GC=F"), ("gold", "GC=F"), ("altin", "GC=F"),
    ("gümüş", "SI=F"), ("silver", "SI=F"), ("gumus", "SI=F"),
    ("petrol", "CL=F"), ("oil", "CL=F"), ("crude", "CL=F"), ("brent", "BZ=F"),
    ("doğalgaz", "NG=F"), ("natural gas", "NG=F"), ("dogalgaz", "NG=F"),
    ("bakır", "HG=F"), ("copper", "HG=F"), ("bakir", "HG=F"),
    ("platin", "PL=F"), ("platinum", "PL=F"),
    ("paladyum", "PA=F"), ("palladium", "PA=F"),

    // Crypto
    ("bitcoin", "BTC-USD"), ("btc", "BTC-USD"),
    ("ethereum", "ETH-USD"), ("eth", "ETH-USD"),
    ("solana", "SOL-USD"), ("sol", "SOL-USD"),
    ("ripple", "XRP-USD"), ("xrp", "XRP-USD"),
    ("dogecoin", "DOGE-USD"), ("doge", "DOGE-USD"),
    ("cardano", "ADA-USD"), ("ada", "ADA-USD"),

    // US equities
    ("nvidia", "NVDA"), ("apple", "AAPL"), ("microsoft", "MSFT"),
    ("google", "GOOGL"), ("alphabet", "GOOGL"), ("amazon", "AMZN"),
    ("tesla", "TSLA"), ("meta", "META"), ("facebook", "META"),
    ("netflix", "NFLX"), ("amd", "AMD"), ("intel", "INTC"),

    // Borsa Istanbul equities
    ("sabancı", "SAHOL.IS"), ("sabanci", "SAHOL.IS"), ("sahol", "SAHOL.IS"),
    ("koç", "KCHOL.IS"), ("koc", "KCHOL.IS"), ("kchol", "KCHOL.IS"),
    ("garanti", "GARAN.IS"), ("garan", "GARAN.IS"),
    ("akbank", "AKBNK.IS"), ("akbnk", "AKBNK.IS"),
    ("yapı kredi", "YKBNK.IS"), ("yapi kredi", "YKBNK.IS"), ("ykbnk", "YKBNK.IS"),
    ("thy", "THYAO.IS"), ("türk hava yolları", "THYAO.IS"), ("thyao", "THYAO.IS"),
    ("turkcell", "TCELL.IS"), ("tcell", "TCELL.IS"),
    ("bim", "BIMAS.IS"), ("bimas", "BIMAS.IS"),
    ("migros", "MGROS.IS"), ("mgros", "MGROS.IS"),
    ("tüpraş", "TUPRS.IS"), ("tupras", "TUPRS.IS"), ("tuprs", "TUPRS.IS"),
    ("aselsan", "ASELS.IS"), ("asels", "ASELS.IS"),
    ("ford otosan", "FROTO.IS"), ("froto", "FROTO.IS"),
    ("tofaş", "TOASO.IS"), ("tofas", "TOASO.IS"), ("toaso", "TOASO.IS"),

    // Indices
    ("bist100", "XU100.IS"), ("bist 100", "XU100.IS"), ("borsa istanbul", "XU100.IS"),
    ("s&p500", "^GSPC"), ("sp500", "^GSPC"), ("s&p 500", "^GSPC"),
    ("nasdaq", "^IXIC"), ("dow jones", "^DJI"), ("dow", "^DJI"),
    ("dax", "^GDAXI"), ("ftse", "^FTSE"),
];
