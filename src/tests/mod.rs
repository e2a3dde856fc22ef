//! Scenario tests for the mailer.


#[cfg(test)]
mod connection_tests;


#[cfg(test)]
mod smtp_tests;
