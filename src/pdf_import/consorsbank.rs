//! Consorsbank (BNP Paribas) document shapes
//!
//! Order confirmations (ORDERABRECHNUNG, including savings plan executions),
//! dividend credits and cash deposits/withdrawals. Amounts are printed
//! before their currency.

use super::draft::DraftKind;
use super::shape::{Block, DocumentType, Section, Shape};
use super::units::ExchangeRate;
use super::BankParser;
use crate::pp::{AccountTransactionType, PortfolioTransactionType};

pub struct ConsorsbankParser {
    detect_patterns: Vec<&'static str>,
    document_types: Vec<DocumentType>,
}

impl ConsorsbankParser {
    pub fn new() -> Self {
        Self {
            detect_patterns: vec![
                "Consorsbank",
                "consorsbank",
                "BNP Paribas S.A. Niederlassung Deutschland",
                "90318 Nürnberg",
                "ORDERABRECHNUNG",
            ],
            document_types: vec![orders(), dividends(), cash_transfers()],
        }
    }
}

impl Default for ConsorsbankParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BankParser for ConsorsbankParser {
    fn detect(&self, content: &str) -> bool {
        self.detect_patterns
            .iter()
            .any(|pattern| content.contains(pattern))
    }

    fn document_types(&self) -> &[DocumentType] {
        &self.document_types
    }

    fn bank_name(&self) -> &'static str {
        "Consorsbank"
    }
}

/// Booking line: zulasten/zugunsten Konto-Nr. 0870740617 336,00 EUR
fn settlement_section() -> Section {
    Section::new(&["amount", "currency"])
        .find(r"(zulasten|zugunsten) Konto-Nr\. \S+ (?<amount>[\.,\d]+) (?<currency>[A-Z]{3})")
        .assign(|t, v| {
            t.amount = Some(v.money("amount", "currency")?);
            Ok(())
        })
}

fn security_section() -> Section {
    Section::new(&["name", "wkn", "isin"])
        .find(r"(Bezeichnung|Wertpapier) WKN ISIN")
        .find(r"(?<name>.*) (?<wkn>[A-Z0-9]{6}) (?<isin>[A-Z]{2}[A-Z0-9]{9}[0-9])")
        .assign(|t, v| {
            t.append_name(v.require("name")?);
            t.security_mut().wkn = Some(v.wkn("wkn")?);
            t.security_mut().isin = Some(v.isin("isin")?);
            Ok(())
        })
}

fn taxes_section() -> Section {
    Section::new(&["label", "tax", "currency"])
        .find(r"(?<label>Quellensteuer|Kapitalertragsteuer|Solidaritätszuschlag|Kirchensteuer)( [\.,\d]+ %)? (?<tax>[\.,\d]+) (?<currency>[A-Z]{3})")
        .optional()
        .multiple_times()
        .assign(|t, v| {
            t.add_tax(v.require("label")?, v.money("tax", "currency")?);
            Ok(())
        })
}

// =============================================================================
// Orders
// =============================================================================

fn orders() -> DocumentType {
    DocumentType::new("Consorsbank order", r"ORDERABRECHNUNG").block(
        Block::new(r"(KAUF|VERKAUF) AM .*")
            .shape(order_shape(
                "Consorsbank purchase",
                PortfolioTransactionType::Buy,
                r"KAUF AM .*",
            ))
            .shape(order_shape(
                "Consorsbank sale",
                PortfolioTransactionType::Sell,
                r"VERKAUF AM .*",
            )),
    )
}

fn order_shape(name: &'static str, kind: PortfolioTransactionType, anchor: &str) -> Shape {
    Shape::new(name, DraftKind::BuySell(kind))
        .anchor(anchor)
        // KAUF AM 07.01.2026 UM 09:30:55 SPARPLAN NR. 357329422.001
        .section(
            Section::new(&["date", "time"])
                .find(r"(KAUF|VERKAUF) AM (?<date>\d{2}\.\d{2}\.\d{4})( UM (?<time>\d{2}:\d{2}(:\d{2})?))?( .*)?")
                .assign(|t, v| {
                    t.date = Some(v.date_time("date", "time")?);
                    Ok(())
                }),
        )
        .section(security_section())
        .section(
            Section::new(&["shares"])
                .find(r"ST (?<shares>[\.,\d]+)")
                .assign(|t, v| {
                    t.shares = Some(v.shares("shares")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["currency"])
                .find(r"Preis pro Anteil [\.,\d]+ (?<currency>[A-Z]{3})")
                .optional()
                .assign(|t, v| {
                    t.security_mut().currency = Some(v.currency("currency")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["gross", "currency"])
                .find(r"Kurswert (?<gross>[\.,\d]+) (?<currency>[A-Z]{3})")
                .assign(|t, v| {
                    t.gross = Some(v.money("gross", "currency")?);
                    Ok(())
                }),
        )
        .section(
            Section::new(&["label", "fee", "currency"])
                .find(r"(?<label>Provision|Grundgebühr|Handelsplatzgebühr|Börsenplatzgebühr|Transaktionsentgelt|Fremde Spesen) (?<fee>[\.,\d]+) (?<currency>[A-Z]{3})")
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
            Section::new(&["plan"])
                .find(r"Sparplanname: (?<plan>.*)")
                .optional()
                .assign(|t, v| {
                    t.add_note(&format!("Sparplan: {}", v.require("plan")?));
                    Ok(())
                }),
        )
}

// =============================================================================
// Dividends
// =============================================================================

fn dividends() -> DocumentType {
    DocumentType::new("Consorsbank dividend", r"(DIVIDENDENGUTSCHRIFT|ERTRAGSGUTSCHRIFT)").block(
        Block::new(r"(DIVIDENDENGUTSCHRIFT|ERTRAGSGUTSCHRIFT)( .*)?").shape(
            Shape::new(
                "Consorsbank dividend",
                DraftKind::Account(AccountTransactionType::Dividends),
            )
            // the booking currency decides which gross line is domestic
            .section(settlement_section())
            .section(security_section())
            .section(
                Section::new(&["shares"])
                    .find(r"Bestand (?<shares>[\.,\d]+) ST")
                    .assign(|t, v| {
                        t.shares = Some(v.shares("shares")?);
                        Ok(())
                    }),
            )
            .section(
                Section::new(&["date"])
                    .find(r"(Valuta|Zahltag) (?<date>\d{2}\.\d{2}\.\d{4})")
                    .assign(|t, v| {
                        t.date = Some(v.date("date")?);
                        Ok(())
                    }),
            )
            .section(
                Section::new(&["currency"])
                    .find(r"(Dividendensatz|Ertragsausschüttung per Stück) [\.,\d]+ (?<currency>[A-Z]{3})")
                    .optional()
                    .assign(|t, v| {
                        t.security_mut().currency = Some(v.currency("currency")?);
                        Ok(())
                    }),
            )
            // Brutto in USD 12,50 USD
            .section(
                Section::new(&["gross", "currency"])
                    .find(r"Brutto in [A-Z]{3} (?<gross>[\.,\d]+) (?<currency>[A-Z]{3})")
                    .multiple_times()
                    .assign(|t, v| {
                        let gross = v.money("gross", "currency")?;
                        if t.booking_currency() == Some(gross.currency.as_str()) {
                            t.gross = Some(gross);
                        } else {
                            t.forex_gross = Some(gross);
                        }
                        Ok(())
                    }),
            )
            // Devisenkurs 1,038500 EUR / USD
            .section(
                Section::new(&["rate", "base", "term"])
                    .find(r"Devisenkurs (?<rate>[\.,\d]+) (?<base>[A-Z]{3}) / (?<term>[A-Z]{3})")
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
            .section(taxes_section()),
        ),
    )
}

// =============================================================================
// Deposits and withdrawals
// =============================================================================

fn cash_transfers() -> DocumentType {
    DocumentType::new("Consorsbank cash transfer", r"(EINZAHLUNG|AUSZAHLUNG)").block(
        Block::new(r"(EINZAHLUNG|AUSZAHLUNG)( .*)?")
            .shape(cash_shape(
                "Consorsbank deposit",
                AccountTransactionType::Deposit,
                r"EINZAHLUNG( .*)?",
                "Einzahlung",
            ))
            .shape(cash_shape(
                "Consorsbank removal",
                AccountTransactionType::Removal,
                r"AUSZAHLUNG( .*)?",
                "Auszahlung",
            )),
    )
}

fn cash_shape(
    name: &'static str,
    kind: AccountTransactionType,
    anchor: &str,
    note: &'static str,
) -> Shape {
    Shape::new(name, DraftKind::Account(kind))
        .anchor(anchor)
        .section(
            Section::new(&["date"])
                .find(r"Valuta (?<date>\d{2}\.\d{2}\.\d{4})")
                .assign(move |t, v| {
                    t.date = Some(v.date("date")?);
                    t.add_note(note);
                    Ok(())
                }),
        )
        .section(settlement_section())
}
