//! DKB (Deutsche Kreditbank) document shapes
//!
//! DKB prints debits with a trailing minus ("2.050,00- EUR") and credits
//! with a trailing plus; the sign is implied by the document kind and is not
//! captured.

use super::draft::DraftKind;
use super::shape::{Block, DocumentType, Section, Shape};
use super::units::ExchangeRate;
use super::BankParser;
use crate::pp::{AccountTransactionType, PortfolioTransactionType};

pub struct DkbParser {
    detect_patterns: Vec<&'static str>,
    document_types: Vec<DocumentType>,
}

impl DkbParser {
    pub fn new() -> Self {
        Self {
            detect_patterns: vec![
                "Deutsche Kreditbank",
                "DKB AG",
                "DKB-Cash",
                "DKB Broker",
                "10919 Berlin",
            ],
            document_types: vec![trades(), dividends()],
        }
    }
}

impl Default for DkbParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BankParser for DkbParser {
    fn detect(&self, content: &str) -> bool {
        self.detect_patterns
            .iter()
            .any(|pattern| content.contains(pattern))
    }

    fn document_types(&self) -> &[DocumentType] {
        &self.document_types
    }

    fn bank_name(&self) -> &'static str {
        "DKB"
    }
}

/// Stück 12 SIEMENS AG NAMENS-AKTIEN O.N. DE0007236101 (723610)
fn position_section() -> Section {
    Section::new(&["shares", "name", "isin", "wkn"])
        .find(r"Stück (?<shares>[\.,\d]+) (?<name>.*) (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9]) \((?<wkn>[A-Z0-9]{6})\)")
        .assign(|t, v| {
            t.shares = Some(v.shares("shares")?);
            t.append_name(v.require("name")?);
            t.security_mut().isin = Some(v.isin("isin")?);
            t.security_mut().wkn = Some(v.wkn("wkn")?);
            Ok(())
        })
}

/// Kapitalertragsteuer 25,00 % auf 200,00 EUR 48,90- EUR
fn taxes_section() -> Section {
    Section::new(&["label", "tax", "currency"])
        .find(r"(?<label>Quellensteuer|Kapitalertragsteuer|Solidaritätszuschlag|Kirchensteuer)( .*)? (?<tax>[\.,\d]+)- (?<currency>[A-Z]{3})")
        .optional()
        .multiple_times()
        .assign(|t, v| {
            t.add_tax(v.require("label")?, v.money("tax", "currency")?);
            Ok(())
        })
}

fn settlement_section() -> Section {
    Section::new(&["amount", "currency"])
        .find(r"Ausmachender Betrag (?<amount>[\.,\d]+)[-+]? (?<currency>[A-Z]{3})")
        .assign(|t, v| {
            t.amount = Some(v.money("amount", "currency")?);
            Ok(())
        })
}

// =============================================================================
// Trades
// =============================================================================

fn trades() -> DocumentType {
    DocumentType::new("DKB trade", r"Wertpapier Abrechnung (Kauf|Verkauf)").block(
        Block::new(r"Wertpapier Abrechnung (Kauf|Verkauf)( .*)?")
            .shape(trade_shape(
                "DKB purchase",
                PortfolioTransactionType::Buy,
                r"Wertpapier Abrechnung Kauf( .*)?",
            ))
            .shape(trade_shape(
                "DKB sale",
                PortfolioTransactionType::Sell,
                r"Wertpapier Abrechnung Verkauf( .*)?",
            )),
    )
}

fn trade_shape(name: &'static str, kind: PortfolioTransactionType, anchor: &str) -> Shape {
    Shape::new(name, DraftKind::BuySell(kind))
        .anchor(anchor)
        .section(position_section())
        .one_of(vec![
            Section::new(&["date", "time"])
                .find(r"Schlusstag/-Zeit (?<date>\d{2}\.\d{2}\.\d{4}) (?<time>\d{2}:\d{2}(:\d{2})?)( .*)?")
                .assign(|t, v| {
                    t.date = Some(v.date_time("date", "time")?);
                    Ok(())
                }),
            Section::new(&["date"])
                .find(r"Schlusstag (?<date>\d{2}\.\d{2}\.\d{4})( .*)?")
                .assign(|t, v| {
                    t.date = Some(v.date("date")?);
                    Ok(())
                }),
        ])
        .section(
            Section::new(&["currency"])
                .find(r"Ausführungskurs [\.,\d]+ (?<currency>[A-Z]{3})( .*)?")
                .optional()
                .assign(|t, v| {
                    t.security_mut().currency = Some(v.currency("currency")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["gross", "currency"])
                .find(r"Kurswert (?<gross>[\.,\d]+)-? (?<currency>[A-Z]{3})")
                .assign(|t, v| {
                    t.gross = Some(v.money("gross", "currency")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["label", "fee", "currency"])
                .find(r"(?<label>Provision|Transaktionsentgelt Börse|Übertragungs-/Liefergebühr|Handelsentgelt) (?<fee>[\.,\d]+)-? (?<currency>[A-Z]{3})")
                .optional()
                .multiple_times()
                .assign(|t, v| {
                    t.add_fee(v.require("label")?, v.money("fee", "currency")?);
                    Ok(())
                }),
        )
        .section(taxes_section())
        .section(settlement_section())
        .section(
            Section::new(&["order"])
                .find(r"Auftragsnummer (?<order>\S+)( .*)?")
                .optional()
                .assign(|t, v| {
                    t.add_note(&format!("Auftragsnummer: {}", v.require("order")?));
                    Ok(())
                }),
        )
}

// =============================================================================
// Dividends
// =============================================================================

fn dividends() -> DocumentType {
    DocumentType::new(
        "DKB dividend",
        r"(Dividendengutschrift|Ertragsgutschrift|Ausschüttung)",
    )
    .block(
        Block::new(r"(Dividendengutschrift|Ertragsgutschrift|Ausschüttung)").shape(
            Shape::new(
                "DKB dividend",
                DraftKind::Account(AccountTransactionType::Dividends),
            )
            .section(position_section())
            // Zahlbarkeitstag 14.03.2024 Dividende pro Stück 0,75 USD
            .section(
                Section::new(&["date", "currency"])
                    .find(r"Zahlbarkeitstag (?<date>\d{2}\.\d{2}\.\d{4})( (Dividende|Ertrag) pro Stück [\.,\d]+ (?<currency>[A-Z]{3}))?")
                    .assign(|t, v| {
                        t.date = Some(v.date("date")?);
                        if v.has("currency") {
                            t.security_mut().currency = Some(v.currency("currency")?);
                        }
                        Ok(())
                    }),
            )
            // Devisenkurs EUR / USD 1,0800
            .section(
                Section::new(&["base", "term", "rate"])
                    .find(r"Devisenkurs (?<base>[A-Z]{3}) / (?<term>[A-Z]{3}) (?<rate>[\.,\d]+)")
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
            .one_of(vec![
                // Dividendengutschrift 18,75 USD 17,36+ EUR
                Section::new(&["forex", "forex_currency", "gross", "currency"])
                    .find(r"(Dividendengutschrift|Ausschüttung) (?<forex>[\.,\d]+) (?<forex_currency>[A-Z]{3}) (?<gross>[\.,\d]+)\+ (?<currency>[A-Z]{3})")
                    .assign(|t, v| {
                        t.forex_gross = Some(v.money("forex", "forex_currency")?);
                        t.gross = Some(v.money("gross", "currency")?);
                        Ok(())
                    }),
                Section::new(&["gross", "currency"])
                    .find(r"(Dividendengutschrift|Ausschüttung) (?<gross>[\.,\d]+)\+ (?<currency>[A-Z]{3})")
                    .assign(|t, v| {
                        t.gross = Some(v.money("gross", "currency")?);
                        Ok(())
                    }),
            ])
            .section(taxes_section())
            .section(settlement_section()),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::pdf_import::builder::RecordBuilder;
    use crate::pdf_import::draft::TransactionDraft;
    use crate::pdf_import::normalizer::normalize_text;
    use crate::pdf_import::registry::InMemorySecurityRegistry;
    use crate::pdf_import::Item;
    use crate::pp::{Money, Provenance, UnitType, SHARES_FACTOR};
    use rust_decimal_macros::dec;

    const PURCHASE: &str = r#"DKB AG · 10919 Berlin
Wertpapier Abrechnung Kauf
Nominale Wertpapierbezeichnung ISIN (WKN)
Stück 12 SIEMENS AG NAMENS-AKTIEN O.N. DE0007236101 (723610)
Handels-/Ausführungsplatz Xetra
Schlusstag/-Zeit 15.03.2024 09:04:12 Auftraggeber Max Mustermann
Ausführungskurs 170,00 EUR Auftragserteilung/ -ort Online-Banking
Kurswert 2.040,00- EUR
Provision 10,00- EUR
Ausmachender Betrag 2.050,00- EUR
Auftragsnummer 123456/78.00
"#;

    const DIVIDEND: &str = r#"DKB AG · 10919 Berlin
Dividendengutschrift
Nominale Wertpapierbezeichnung ISIN (WKN)
Stück 25 MICROSOFT CORP. REGISTERED SHARES DL-,00000625 US5949181045 (870747)
Zahlbarkeitstag 14.03.2024 Dividende pro Stück 0,75 USD
Devisenkurs EUR / USD 1,0800
Dividendengutschrift 18,75 USD 17,36+ EUR
Quellensteuer 15,00 % auf 18,75 USD 2,81- USD
Kapitalertragsteuer 10,00 % auf 17,36 EUR 1,74- EUR
Ausmachender Betrag 13,02+ EUR
"#;

    fn single(text: &str) -> TransactionDraft {
        let parser = DkbParser::new();
        let text = normalize_text(text);
        assert!(parser.detect(&text));
        let mut outcomes = parser.read_blocks(&text);
        assert_eq!(outcomes.len(), 1);
        outcomes.remove(0).result.unwrap()
    }

    #[test]
    fn test_parse_buy() {
        let draft = single(PURCHASE);
        assert_eq!(draft.shape, "DKB purchase");
        assert_eq!(draft.date.unwrap().to_string(), "2024-03-15 09:04:00");
        assert_eq!(draft.shares, Some(12 * SHARES_FACTOR));
        assert_eq!(draft.gross, Some(Money::new(204000, "EUR")));
        assert_eq!(draft.fees[0].amount, Money::new(1000, "EUR"));
        assert_eq!(draft.amount, Some(Money::new(205000, "EUR")));
        assert_eq!(draft.note().as_deref(), Some("Auftragsnummer: 123456/78.00"));

        let security = draft.security.unwrap();
        assert_eq!(security.name.as_deref(), Some("SIEMENS AG NAMENS-AKTIEN O.N."));
        assert_eq!(security.isin.as_deref(), Some("DE0007236101"));
        assert_eq!(security.wkn.as_deref(), Some("723610"));
    }

    #[test]
    fn test_parse_sell_with_taxes() {
        let text = PURCHASE
            .replace("Abrechnung Kauf", "Abrechnung Verkauf")
            .replace("Kurswert 2.040,00- EUR", "Kurswert 2.040,00 EUR")
            .replace(
                "Ausmachender Betrag 2.050,00- EUR",
                "Kapitalertragsteuer 25,00 % auf 100,00 EUR 25,00- EUR\nAusmachender Betrag 2.005,00+ EUR",
            );
        let draft = single(&text);
        assert_eq!(draft.kind, DraftKind::BuySell(PortfolioTransactionType::Sell));
        assert_eq!(draft.taxes[0].amount, Money::new(2500, "EUR"));
        assert_eq!(draft.amount, Some(Money::new(200500, "EUR")));
    }

    #[test]
    fn test_parse_dividend() {
        let draft = single(DIVIDEND);
        assert_eq!(draft.date.unwrap().to_string(), "2024-03-14 00:00:00");
        assert_eq!(draft.shares, Some(25 * SHARES_FACTOR));
        assert_eq!(draft.gross, Some(Money::new(1736, "EUR")));
        assert_eq!(draft.forex_gross, Some(Money::new(1875, "USD")));
        assert_eq!(
            draft.exchange_rate,
            Some(ExchangeRate::new("EUR", "USD", dec!(1.08)))
        );
        assert_eq!(draft.taxes.len(), 2);
        assert_eq!(draft.amount, Some(Money::new(1302, "EUR")));
    }

    #[test]
    fn test_dividend_withholding_tax_is_converted() {
        let registry = InMemorySecurityRegistry::new();
        let builder = RecordBuilder::new(&registry, &ExtractorConfig::default());
        let items = builder
            .build(&single(DIVIDEND), &Provenance::new("Dividende.pdf"))
            .unwrap();
        assert_eq!(items.len(), 2);

        let Item::Transaction(transaction) = &items[1] else {
            panic!("expected an account transaction");
        };
        assert_eq!(transaction.amount, Money::new(1302, "EUR"));

        let withholding = transaction
            .units
            .iter()
            .find(|u| u.label.as_deref() == Some("Quellensteuer"))
            .unwrap();
        assert_eq!(withholding.unit_type, UnitType::Tax);
        assert_eq!(withholding.amount, Money::new(260, "EUR"));
        assert_eq!(
            withholding.forex.as_ref().map(|f| f.amount.clone()),
            Some(Money::new(281, "USD"))
        );

        let gross = &transaction.units[0];
        assert_eq!(gross.unit_type, UnitType::GrossValue);
        assert_eq!(gross.amount, Money::new(1736, "EUR"));
    }
}
