//! comdirect bank document shapes
//!
//! Trade confirmations (Wertpapierkauf / Wertpapierverkauf), dividend
//! notices with kerned headings, the separate tax treatment notices
//! (Steuerliche Behandlung), custody fee statements and the Finanzreport
//! account statement.

use super::draft::DraftKind;
use super::shape::{Block, DocumentType, Section, Shape};
use super::units::ExchangeRate;
use super::BankParser;
use crate::pp::{AccountTransactionType, PortfolioTransactionType};

pub struct ComdirectParser {
    detect_patterns: Vec<&'static str>,
    document_types: Vec<DocumentType>,
}

impl ComdirectParser {
    pub fn new() -> Self {
        Self {
            detect_patterns: vec!["comdirect bank", "comdirect.de", "25449 Quickborn"],
            document_types: vec![
                trades(),
                dividends(),
                tax_treatments(),
                custody_fees(),
                statements(),
            ],
        }
    }
}

impl Default for ComdirectParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BankParser for ComdirectParser {
    fn detect(&self, content: &str) -> bool {
        self.detect_patterns
            .iter()
            .any(|pattern| content.contains(pattern))
    }

    fn document_types(&self) -> &[DocumentType] {
        &self.document_types
    }

    fn bank_name(&self) -> &'static str {
        "comdirect"
    }
}

// =============================================================================
// Shared sections
// =============================================================================

/// Name and WKN on one line, name continuation and ISIN on the next
fn security_section() -> Section {
    Section::new(&["name", "wkn", "name1", "isin"])
        .find(r"Wertpapier-Bezeichnung.*")
        .find(r"(?<name>.*) (?<wkn>[A-Z0-9]{6})")
        .find(r"(?<name1>.*) (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9])")
        .assign(|t, v| {
            t.append_name(v.require("name")?);
            t.append_name(v.get("name1").unwrap_or_default());
            t.security_mut().wkn = Some(v.wkn("wkn")?);
            t.security_mut().isin = Some(v.isin("isin")?);
            Ok(())
        })
}

/// Settlement line below "Verrechnung über Konto"
fn settlement_section() -> Section {
    Section::new(&["currency", "amount"])
        .find(r"Verrechnung über Konto.*")
        .find(r".* [A-Z]{3} \d{2}\.\d{2}\.\d{4} (?<currency>[A-Z]{3}) (?<amount>[\.,\d]+)")
        .assign(|t, v| {
            t.amount = Some(v.money("amount", "currency")?);
            Ok(())
        })
}

fn reference_section() -> Section {
    Section::new(&["reference"])
        .find(r"Ref\.-Nr\. : (?<reference>\S+)")
        .optional()
        .assign(|t, v| {
            t.add_note(&format!("Ref.-Nr.: {}", v.require("reference")?));
            Ok(())
        })
}

// =============================================================================
// Trades
// =============================================================================

fn trades() -> DocumentType {
    DocumentType::new("comdirect trade", r"Wertpapier(kauf|verkauf)")
        .must_not_include("Finanzreport")
        .block(
            Block::new(r"Wertpapier(kauf|verkauf)( .*)?")
                .shape(trade_shape(
                    "comdirect purchase",
                    PortfolioTransactionType::Buy,
                    r"Wertpapierkauf( .*)?",
                ))
                .shape(trade_shape(
                    "comdirect sale",
                    PortfolioTransactionType::Sell,
                    r"Wertpapierverkauf( .*)?",
                )),
        )
}

fn trade_shape(name: &'static str, kind: PortfolioTransactionType, anchor: &str) -> Shape {
    Shape::new(name, DraftKind::BuySell(kind))
        .anchor(anchor)
        // Geschäftstag : 18.07.2016 Ausführungszeit : 17:02 Uhr
        .section(
            Section::new(&["date", "time"])
                .find(r"Geschäftstag : (?<date>\d{2}\.\d{2}\.\d{4})( Ausführungszeit : (?<time>\d{2}:\d{2}) Uhr)?.*")
                .assign(|t, v| {
                    t.date = Some(v.date_time("date", "time")?);
                    Ok(())
                }),
        )
        .section(security_section())
        // St. 160 EUR 120,647
        .section(
            Section::new(&["shares", "currency"])
                .find(r"St\. (?<shares>[\.,\d]+) (?<currency>[A-Z]{3}) [\.,\d]+")
                .assign(|t, v| {
                    t.shares = Some(v.shares("shares")?);
                    t.security_mut().currency = Some(v.currency("currency")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["currency", "gross"])
                .find(r"Kurswert : (?<currency>[A-Z]{3}) (?<gross>[\.,\d]+)")
                .assign(|t, v| {
                    t.gross = Some(v.money("gross", "currency")?);
                    Ok(())
                }),
        )
        // Umrechn. zum Dev. kurs 1,080600 vom 16.04.2020 : EUR 4.412,36
        .section(
            Section::new(&["rate", "currency", "gross"])
                .find(r"Umrechn\. zum Dev\. kurs (?<rate>[\.,\d]+) vom \d{2}\.\d{2}\.\d{4} : (?<currency>[A-Z]{3}) (?<gross>[\.,\d]+)")
                .optional()
                .assign(|t, v| {
                    let domestic = v.money("gross", "currency")?;
                    if let Some(foreign) = t.gross.take() {
                        t.exchange_rate = Some(ExchangeRate::new(
                            domestic.currency.as_str(),
                            foreign.currency.as_str(),
                            v.rate("rate")?,
                        ));
                        t.forex_gross = Some(foreign);
                    }
                    t.gross = Some(domestic);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["label", "currency", "fee"])
                .find(r"(?<label>Provision|Börsenplatzabhängiges Entgelt|Variable Börsenspesen|Handelsplatzentgelt|Übertragungs-/Liefergebühr|Fremde Spesen) : (?<currency>[A-Z]{3}) (?<fee>[\.,\d]+)")
                .optional()
                .multiple_times()
                .assign(|t, v| {
                    t.add_fee(v.require("label")?, v.money("fee", "currency")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["label", "currency", "tax"])
                .find(r"(?<label>Kapitalertragsteuer|Solidaritätszuschlag|Kirchensteuer) : (?<currency>[A-Z]{3}) (?<tax>[\.,\d]+)")
                .optional()
                .multiple_times()
                .assign(|t, v| {
                    t.add_tax(v.require("label")?, v.money("tax", "currency")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["order", "invoice"])
                .find(r"Ord\.-Nr\. : (?<order>\S+) Rechnungsnummer : (?<invoice>\S+)")
                .optional()
                .assign(|t, v| {
                    t.add_note(&format!(
                        "Ord.-Nr.: {} | R.-Nr.: {}",
                        v.require("order")?,
                        v.require("invoice")?
                    ));
                    Ok(())
                }),
        )
        .section(settlement_section())
}

// =============================================================================
// Dividends
// =============================================================================

fn dividends() -> DocumentType {
    DocumentType::new("comdirect dividend", r"Gutschrift fälliger Wertpapier-Erträge")
        // reinvested income produces no cash flow
        .must_not_include("Ertragsthesaurierung")
        .block(
            Block::new(r"Gutschrift fälliger Wertpapier-Erträge").shape(
                Shape::new(
                    "comdirect dividend",
                    DraftKind::Account(AccountTransactionType::Dividends),
                )
                .section(reference_section())
                // per 03.08.2020 <name> 859034
                // STK 32,000 <name> US1266501006
                .section(
                    Section::new(&["date", "name", "wkn", "shares", "name1", "isin"])
                        .find(r"per (?<date>\d{2}\.\d{2}\.\d{4}) (?<name>.*) (?<wkn>[A-Z0-9]{6})")
                        .find(r"STK (?<shares>[\.,\d]+) (?<name1>.*) (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9])")
                        .assign(|t, v| {
                            t.date = Some(v.date("date")?);
                            t.shares = Some(v.shares("shares")?);
                            t.append_name(v.require("name")?);
                            t.append_name(v.get("name1").unwrap_or_default());
                            t.security_mut().wkn = Some(v.wkn("wkn")?);
                            t.security_mut().isin = Some(v.isin("isin")?);
                            Ok(())
                        }),
                )
                .section(
                    Section::new(&["kind"])
                        .find(r"(?<kind>Quartalsdividende|Zwischendividende|Sonderdividende|Schlussdividende|Abschlagsdividende)")
                        .optional()
                        .assign(|t, v| {
                            t.add_note(v.require("kind")?);
                            Ok(())
                        }),
                )
                .section(
                    Section::new(&["currency", "gross"])
                        .find(r"Bruttobetrag: (?<currency>[A-Z]{3}) (?<gross>[\.,\d]+)")
                        .assign(|t, v| {
                            let gross = v.money("gross", "currency")?;
                            t.security_mut().currency = Some(gross.currency.clone());
                            t.gross = Some(gross);
                            Ok(())
                        }),
                )
                // zum Devisenkurs: EUR/USD 1,167900 EUR 13,70
                .section(
                    Section::new(&["base", "term", "rate"])
                        .find(r"zum Devisenkurs: (?<base>[A-Z]{3})/(?<term>[A-Z]{3}) (?<rate>[\.,\d]+)( .*)?")
                        .optional()
                        .assign(|t, v| {
                            t.exchange_rate = Some(ExchangeRate::new(
                                v.currency("base")?,
                                v.currency("term")?,
                                v.rate("rate")?,
                            ));
                            Ok(())
                        }),
                )
                // abzüglich US-Quellensteuer: USD 2,41
                .section(
                    Section::new(&["label", "currency", "tax"])
                        .find(r"abzüglich ([A-Z]{2}-)?(?<label>Quellensteuer)( .*)?: (?<currency>[A-Z]{3}) (?<tax>[\.,\d]+)")
                        .optional()
                        .multiple_times()
                        .assign(|t, v| {
                            t.add_tax(v.require("label")?, v.money("tax", "currency")?);
                            Ok(())
                        }),
                )
                .section(settlement_section()),
            ),
        )
}

// =============================================================================
// Tax treatment notices
// =============================================================================

fn tax_treatments() -> DocumentType {
    DocumentType::new("comdirect tax treatment", r"Steuerliche Behandlung: ").block(
        Block::new(r"Steuerliche Behandlung: .*")
            .shape(
                tax_shape("comdirect advance lump sum", true)
                    .anchor(r"Steuerliche Behandlung: Vorabpauschale .*"),
            )
            .shape(tax_shape("comdirect tax treatment", false)),
    )
}

fn tax_shape(name: &'static str, advance_lump_sum: bool) -> Shape {
    let mut shape = Shape::new(name, DraftKind::Account(AccountTransactionType::Taxes))
        .section(
            Section::new(&["date"])
                .find(r"Steuerliche Behandlung: .* vom (?<date>\d{2}\.\d{2}\.\d{4})")
                .assign(move |t, v| {
                    t.date = Some(v.date("date")?);
                    if advance_lump_sum {
                        t.add_note("Vorabpauschale");
                    }
                    Ok(())
                }),
        )
        // Stk. 32 CVS HEALTH CORP. DL-,01 , WKN / ISIN: 859034 / US1266501006
        .section(
            Section::new(&["shares", "name", "wkn", "isin"])
                .find(r"Stk\. (?<shares>[\.,\d]+) (?<name>.*) , WKN / ISIN: (?<wkn>[A-Z0-9]{6}) / (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9])")
                .assign(|t, v| {
                    t.shares = Some(v.shares("shares")?);
                    t.append_name(v.require("name")?);
                    t.security_mut().wkn = Some(v.wkn("wkn")?);
                    t.security_mut().isin = Some(v.isin("isin")?);
                    Ok(())
                }),
        );

    if advance_lump_sum {
        shape = shape.section(reference_section());
    }

    shape
        // Kapitalertragsteuer 25,00 % auf 5,51 EUR 1,38
        .section(
            Section::new(&["label", "currency", "tax"])
                .find(r"(?<label>Kapitalertragsteuer|Solidaritätszuschlag|Kirchensteuer|Quellensteuer) .* (?<currency>[A-Z]{3}) (?<tax>[\.,\d]+)")
                .optional()
                .multiple_times()
                .assign(|t, v| {
                    t.add_tax(v.require("label")?, v.money("tax", "currency")?);
                    Ok(())
                }),
        )
        .one_of(vec![
            Section::new(&["currency", "amount"])
                .find(r"Abgeführte Steuern (?<currency>[A-Z]{3}) (?<amount>[\.,\d]+)")
                .assign(|t, v| {
                    let amount = v.money("amount", "currency")?;
                    if amount.is_zero() {
                        t.failure = Some("tax booking without amount is not supported".to_string());
                    }
                    t.amount = Some(amount);
                    Ok(())
                }),
            Section::new(&["currency", "amount"])
                .find(r"Erstattete Steuern (?<currency>[A-Z]{3}) (?<amount>[\.,\d]+)")
                .assign(|t, v| {
                    t.kind = DraftKind::Account(AccountTransactionType::TaxRefund);
                    let amount = v.money("amount", "currency")?;
                    if amount.is_zero() {
                        t.failure = Some("tax booking without amount is not supported".to_string());
                    }
                    t.amount = Some(amount);
                    Ok(())
                }),
        ])
}

// =============================================================================
// Custody fees
// =============================================================================

fn custody_fees() -> DocumentType {
    DocumentType::new("comdirect custody fee", r"Verwahrentgelt").block(
        Block::new(r"Abrechnung Verwahrentgelt .*").shape(
            Shape::new(
                "comdirect custody fee",
                DraftKind::Account(AccountTransactionType::Fees),
            )
            // the fee is booked against the WKN only
            .section(
                Section::new(&["name", "wkn", "rate"])
                    .find(r"Wertpapier-Bezeichnung.*")
                    .find(r"(?<name>.*) (?<wkn>[A-Z0-9]{6})")
                    .find(r"Bemessungsgrundlage: .* Satz: (?<rate>[\.,\d]+) %")
                    .assign(|t, v| {
                        let name = v.require("name")?;
                        t.add_note(&format!("Verwahrentgelt {} ({} %)", name, v.require("rate")?));
                        t.append_name(name);
                        t.security_mut().wkn = Some(v.wkn("wkn")?);
                        Ok(())
                    }),
            )
            .section(
                Section::new(&["name1"])
                    .find(r"(?<name1>.*) [A-Z]{2}[A-Z0-9]{9}[0-9]")
                    .optional()
                    .assign(|t, v| {
                        t.append_name(v.require("name1")?);
                        Ok(())
                    }),
            )
            .section(
                Section::new(&["date", "currency", "amount"])
                    .find(r"Verrechnung über Konto.*")
                    .find(r".* [A-Z]{3} (?<date>\d{2}\.\d{2}\.\d{4}) (?<currency>[A-Z]{3}) (?<amount>[\.,\d]+)")
                    .assign(|t, v| {
                        t.date = Some(v.date("date")?);
                        t.amount = Some(v.money("amount", "currency")?);
                        Ok(())
                    }),
            ),
        ),
    )
}

// =============================================================================
// Finanzreport
// =============================================================================

fn statements() -> DocumentType {
    DocumentType::new("comdirect statement", r"Finanzreport")
        .context(r"Alter Saldo (?<currency>[A-Z]{3}) .*")
        .block(
            Block::new(r"\d{2}\.\d{2}\.\d{4} \d{2}\.\d{2}\.\d{4} .* [-+][\.,\d]+").shape(
                Shape::new(
                    "comdirect statement",
                    DraftKind::Account(AccountTransactionType::Deposit),
                )
                // 01.10.2019 01.10.2019 Lastschrift Stadtwerke -45,00
                .section(
                    Section::new(&["date", "text", "sign", "amount"])
                        .find(r"(?<date>\d{2}\.\d{2}\.\d{4}) \d{2}\.\d{2}\.\d{4} (?<text>.*) (?<sign>[-+])(?<amount>[\.,\d]+)")
                        .assign(|t, v| {
                            let text = v.require("text")?;
                            t.kind = DraftKind::Account(statement_type(text, v.get("sign") == Some("-")));
                            t.date = Some(v.date("date")?);
                            t.amount = Some(v.money("amount", "currency")?);
                            t.add_note(text);
                            Ok(())
                        }),
                ),
            ),
        )
}

/// Type of a statement line from its text and direction
fn statement_type(text: &str, debit: bool) -> AccountTransactionType {
    use AccountTransactionType::*;

    if text.contains("Zinsen") || text.contains("Zinsabschluss") {
        if debit {
            InterestCharge
        } else {
            Interest
        }
    } else if text.contains("Entgelt") || text.contains("Gebühr") {
        if debit {
            Fees
        } else {
            Deposit
        }
    } else if text.contains("Kapitalertragsteuer") {
        if debit {
            Taxes
        } else {
            TaxRefund
        }
    } else if debit {
        Removal
    } else {
        Deposit
    }
}

/// Document texts used by the tests of this crate
#[cfg(test)]
pub(crate) mod fixtures {
    pub const PURCHASE: &str = r#"comdirect bank
25449 Quickborn
Herrn
Max Mustermann
Wertpapierkauf
Geschäftstag : 18.07.2016 Ausführungszeit : 17:02 Uhr
Börsenplatz : Xetra
Wertpapier-Bezeichnung WPKNR/ISIN
Vanguard FTSE All-World U.ETF A1JX52
Registered Shares USD Dis.oN IE00B3RBWM25
Nennwert Zum Kurs von
St. 160 EUR 120,647
Kurswert : EUR 19.303,52
Provision : EUR 53,16
Börsenplatzabhängiges Entgelt : EUR 2,50
Kapitalertragsteuer : EUR 0,00
Ord.-Nr. : 072324316450-001 Rechnungsnummer : 245008409461D1D5
Verrechnung über Konto Valuta Zu Ihren Lasten vor Steuern
1234567 00 EUR 20.07.2016 EUR 19.359,18
"#;

    pub const FOREX_PURCHASE: &str = r#"comdirect bank
Wertpapierkauf
Geschäftstag : 16.04.2020 Ausführungszeit : 18:33 Uhr
Wertpapier-Bezeichnung WPKNR/ISIN
Amazon.com Inc. 906866
Registered Shares DL -,01 US0231351067
Nennwert Zum Kurs von
St. 2 USD 2.384,00
Kurswert : USD 4.768,00
Provision : EUR 18,93
Fremde Spesen : USD 13,90
Umrechn. zum Dev. kurs 1,080600 vom 16.04.2020 : EUR 4.412,36
Verrechnung über Konto Valuta Zu Ihren Lasten vor Steuern
1234567 00 EUR 20.04.2020 EUR 4.444,15
"#;

    pub const DIVIDEND: &str = r#"comdirect bank
25449 Quickborn
G u t s c h r i f t  f ä l l i g e r  W e r t p a p i e r - E r t r ä g e
Ref.-Nr. : 1N3KLMTB5RC00123
p e r  0 3 . 0 8 . 2 0 2 0  C VS H e a lt h Co r p.  8 5 9 0 3 4
S T K  3 2 , 0 0 0  R eg is te r ed S h a re s D L -, 0 1  U S 1 2 6 6 5 0 1 0 0 6
Zahlbarkeitstag 03.08.2020 Dividende pro Stück 0,50 USD
Quartalsdividende
Bruttobetrag: USD 16,00
zum Devisenkurs: EUR/USD 1,167900 EUR 13,70
abzüglich US-Quellensteuer: USD 2,41
Verrechnung über Konto Valuta Zu Ihren Gunsten vor Steuern
1234567 00 EUR 03.08.2020 EUR 11,64
"#;

    pub const DIVIDEND_TAXES: &str = r#"comdirect bank
25449 Quickborn
Steuerliche Behandlung: Ausländische Dividende vom 03.08.2020
Stk. 32 CVS HEALTH CORP. DL-,01 , WKN / ISIN: 859034 / US1266501006
Steuerbemessungsgrundlage vor Verlustverrechnung EUR 13,70
Kapitalertragsteuer 25,00 % auf 5,51 EUR 1,38
Solidaritätszuschlag 5,50 % auf 1,38 EUR 0,07
Kirchensteuer 8,00 % auf 1,38 EUR 0,00
Quellensteuer 15,00 % auf 13,70 EUR 2,06
Abgeführte Steuern EUR 3,51
"#;

    pub const STATEMENT: &str = r#"comdirect bank
Finanzreport Nr. 12 per 31.12.2019
Girokonto 1234567 00
Buchungstag Valuta Vorgang Buchungstext Ausgang Eingang
Alter Saldo EUR 1.024,00
01.10.2019 01.10.2019 Lastschrift Stadtwerke Musterstadt -45,00
Abschlag Strom
02.10.2019 02.10.2019 Übertrag auf Girokonto +200,00
31.12.2019 31.12.2019 Kontoabschluss Abschluss Zinsen +0,12
31.12.2019 31.12.2019 Kontoabschluss Entgelte -4,90
Neuer Saldo EUR 1.174,22
"#;
}
