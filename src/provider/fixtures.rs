//! Test fixtures: representative payloads from each provider.
//!
//! These are structurally complete but truncated to the minimum needed to
//! exercise the parsers. Shapes follow what the live services return:
//!
//!   COOPS datagetter   {"data": [{"t", "v", "s", "f", "q"}]} or {"predictions": [...]}
//!   COOPS mdapi        {"stations": [{"id", "name", "lat", "lng", ...}]}
//!   USGS IV            value.timeSeries[].values[0].value[] (values are STRINGS)
//!   USGS site service  tab-separated RDB with '#' comments and a format row
//!   IOC data           [{"slevel", "stime", "sensor"}]
//!   IOC station list   [{"Code", "Location", "Lat", "Lon", "added_to_system", ...}]
//!   CWMS timeseries    {"name", "units", "values": [[ms, value, quality]], "next-page"}
//!   NDBC stdmet        whitespace columns under a '#YY MM DD hh mm ...' header, "MM" = missing
//!   NDBC stations      <stations><station id=".." lat=".." lon=".." .../></stations>
//!   CHS data           [{"eventDate", "value", "qcFlagCode", "timeSeriesId"}]
//!   CWMS catalog       {"entries": [{"office", "name", "latitude", "longitude"}], "next-page"}

// ---------------------------------------------------------------------------
// COOPS
// ---------------------------------------------------------------------------

/// The Battery, NY. Three six-minute steps; the middle one has no value.
pub(crate) fn fixture_coops_water_level_json() -> &'static str {
    r#"{
      "metadata": { "id": "8518750", "name": "The Battery", "lat": "40.7006", "lon": "-74.0142" },
      "data": [
        { "t": "2024-05-01 00:00", "v": "0.412", "s": "0.003", "f": "0,0,0,0", "q": "p" },
        { "t": "2024-05-01 00:06", "v": "",      "s": "",      "f": "1,1,1,1", "q": "p" },
        { "t": "2024-05-01 00:12", "v": "0.437", "s": "0.004", "f": "0,0,0,0", "q": "p" }
      ]
    }"#
}

/// Harmonic predictions come back under `predictions`, without flags.
pub(crate) fn fixture_coops_predictions_json() -> &'static str {
    r#"{
      "predictions": [
        { "t": "2024-05-01 00:00", "v": "0.385" },
        { "t": "2024-05-01 00:06", "v": "0.401" }
      ]
    }"#
}

pub(crate) fn fixture_coops_wind_json() -> &'static str {
    r#"{
      "metadata": { "id": "8518750", "name": "The Battery", "lat": "40.7006", "lon": "-74.0142" },
      "data": [
        { "t": "2024-05-01 00:00", "s": "3.60", "d": "212.00", "dr": "SSW", "g": "5.20", "f": "0,0" }
      ]
    }"#
}

/// Second station has no surveyed position.
pub(crate) fn fixture_coops_stations_json() -> &'static str {
    r#"{
      "count": 3,
      "units": null,
      "stations": [
        { "id": "8518750", "name": "The Battery", "state": "NY", "tidal": true,
          "lat": 40.700554, "lng": -74.0142, "affiliations": "NWLORTS" },
        { "id": "9999999", "name": "Unsurveyed Test Gauge", "state": "",
          "lat": null, "lng": null },
        { "id": "8516990", "name": "Willets Point", "state": "NY", "tidal": true,
          "lat": 40.7933, "lng": -73.7817, "status": "discontinued",
          "removed": "2013-07-08 00:00:00,2008-12-22 00:00:00" }
      ]
    }"#
}

// ---------------------------------------------------------------------------
// USGS
// ---------------------------------------------------------------------------

/// Kingston Mines (05568500) discharge, three readings, deliberately out of
/// order, with one sentinel in the middle.
pub(crate) fn fixture_usgs_discharge_json() -> &'static str {
    r#"{
      "value": {
        "timeSeries": [
          {
            "sourceInfo": {
              "siteName": "Illinois River at Kingston Mines, IL",
              "siteCode": [{ "value": "05568500", "network": "NWIS", "agencyCode": "USGS" }],
              "geoLocation": {
                "geogLocation": { "srs": "EPSG:4326", "latitude": 40.5614, "longitude": -89.9956 }
              }
            },
            "variable": {
              "variableCode": [{ "value": "00060", "network": "NWIS" }],
              "variableName": "Streamflow, ft&#179;/s",
              "unit": { "unitCode": "ft3/s" },
              "noDataValue": -999999.0
            },
            "values": [{
              "value": [
                { "value": "42400", "qualifiers": ["P"], "dateTime": "2024-05-01T12:30:00.000-05:00" },
                { "value": "-999999", "qualifiers": ["P", "Ice"], "dateTime": "2024-05-01T12:15:00.000-05:00" },
                { "value": "42300", "qualifiers": ["A"], "dateTime": "2024-05-01T12:00:00.000-05:00" }
              ],
              "qualifier": [{ "qualifierCode": "P", "qualifierDescription": "Provisional data subject to revision." }]
            }]
          },
          {
            "sourceInfo": {
              "siteName": "Illinois River at Kingston Mines, IL",
              "siteCode": [{ "value": "05568500", "network": "NWIS", "agencyCode": "USGS" }]
            },
            "variable": {
              "variableCode": [{ "value": "00065", "network": "NWIS" }],
              "variableName": "Gage height, ft",
              "unit": { "unitCode": "ft" },
              "noDataValue": -999999.0
            },
            "values": [{
              "value": [
                { "value": "18.42", "qualifiers": ["P"], "dateTime": "2024-05-01T12:00:00.000-05:00" }
              ],
              "qualifier": []
            }]
          }
        ]
      }
    }"#
}

/// Mackinaw River gauge with an empty value array: a sensor outage.
pub(crate) fn fixture_usgs_empty_value_array_json() -> &'static str {
    r#"{
      "value": {
        "timeSeries": [
          {
            "sourceInfo": {
              "siteName": "Mackinaw River near Green Valley, IL",
              "siteCode": [{ "value": "05568580", "network": "NWIS", "agencyCode": "USGS" }]
            },
            "variable": {
              "variableCode": [{ "value": "00060", "network": "NWIS" }],
              "variableName": "Streamflow, ft&#179;/s",
              "unit": { "unitCode": "ft3/s" },
              "noDataValue": -999999.0
            },
            "values": [{ "value": [], "qualifier": [] }]
          }
        ]
      }
    }"#
}

/// Site service output for two Illinois sites; the second lacks coordinates.
pub(crate) fn fixture_usgs_sites_rdb() -> &'static str {
    "#\n\
     # US Geological Survey\n\
     # retrieved: 2024-05-01 12:00:00 -05:00\n\
     #\n\
     agency_cd\tsite_no\tstation_nm\tsite_tp_cd\tdec_lat_va\tdec_long_va\tcoord_acy_cd\tdec_coord_datum_cd\thuc_cd\tparm_cd\tbegin_date\tend_date\n\
     5s\t15s\t50s\t7s\t16s\t16s\t1s\t10s\t16s\t5s\t20d\t20d\n\
     USGS\t05567500\tILLINOIS RIVER AT PEORIA, IL\tST\t40.6939\t-89.5898\tS\tNAD83\t07130001\t00065\t1940-10-01\t2024-04-30\n\
     USGS\t05567500\tILLINOIS RIVER AT PEORIA, IL\tST\t40.6939\t-89.5898\tS\tNAD83\t07130001\t00060\t1940-10-01\t2024-03-31\n\
     USGS\t05568000\tILLINOIS RIVER AT CHILLICOTHE, IL\tST\t\t\t\t\t07130001\t00065\t1985-10-01\t1998-09-30\n"
}

// ---------------------------------------------------------------------------
// IOC
// ---------------------------------------------------------------------------

/// Two sensors; `prs` repeats a timestamp (kept once, first wins).
pub(crate) fn fixture_ioc_data_json() -> &'static str {
    r#"[
      { "slevel": 1.512, "stime": "2024-05-01 00:00:00", "sensor": "prs" },
      { "slevel": 1.498, "stime": "2024-05-01 00:01:00", "sensor": "prs" },
      { "slevel": 9.999, "stime": "2024-05-01 00:01:00", "sensor": "prs" },
      { "slevel": 3.021, "stime": "2024-05-01 00:00:00", "sensor": "rad" },
      { "slevel": null,  "stime": "2024-05-01 00:01:00", "sensor": "rad" },
      { "slevel": 27.5,  "stime": "2024-05-01 00:00:00", "sensor": "wtt" }
    ]"#
}

pub(crate) fn fixture_ioc_not_found_json() -> &'static str {
    r#"[{"error":"code 'zzzz' not found"}]"#
}

pub(crate) fn fixture_ioc_stations_json() -> &'static str {
    r#"[
      { "Code": "abed", "Location": "Aberdeen", "country": "UK", "Lat": 57.144, "Lon": -2.077,
        "added_to_system": "2011-09-23 13:54:47", "sensor": "rad", "gloss_id": "240", "delay": "4'" },
      { "Code": "acap2", "Location": "Acapulco", "country": "Mexico", "Lat": 16.838, "Lon": -99.904,
        "added_to_system": null, "sensor": "prs", "delay": "-2'" },
      { "Code": "ambon", "Location": "Ambon", "country": "Indonesia", "Lat": -3.68, "Lon": 128.18,
        "added_to_system": "2014-03-01 00:00:00", "sensor": "prs", "delay": "40d" }
    ]"#
}

// ---------------------------------------------------------------------------
// CWMS
// ---------------------------------------------------------------------------

/// First page of a Grafton stage series; array-form values, one null.
pub(crate) fn fixture_cwms_page_one_json() -> &'static str {
    r#"{
      "name": "Grafton-Mississippi.Stage.Inst.15Minutes.0.Ccp-Rev",
      "office-id": "MVS",
      "units": "ft",
      "value-columns": [
        { "name": "date-time", "ordinal": 1, "datatype": "java.sql.Timestamp" },
        { "name": "value", "ordinal": 2, "datatype": "java.lang.Double" },
        { "name": "quality-code", "ordinal": 3, "datatype": "int" }
      ],
      "values": [
        [1714521600000, 15.21, 0],
        [1714522500000, null, 5],
        [1714523400000, 15.25, 0]
      ],
      "next-page": "MTcxNDUyMzQwMDAwMHx8MTAwMHx8Mw=="
    }"#
}

/// Second (last) page, object-form values as older deployments return them.
pub(crate) fn fixture_cwms_page_two_json() -> &'static str {
    r#"{
      "name": "Grafton-Mississippi.Stage.Inst.15Minutes.0.Ccp-Rev",
      "office-id": "MVS",
      "units": "ft",
      "values": [
        { "date-time": 1714524300000, "value": 15.3, "quality": 0 }
      ]
    }"#
}

pub(crate) fn fixture_cwms_catalog_json() -> &'static str {
    r#"{
      "page": "MHx8MTAw",
      "page-size": 100,
      "total": 2,
      "entries": [
        { "office": "MVS", "name": "Grafton-Mississippi", "public-name": "Mississippi River at Grafton",
          "latitude": 38.968, "longitude": -90.429, "kind": "SITE", "active": true },
        { "office": "MVS", "name": "Retired-Gage", "public-name": null,
          "latitude": null, "longitude": null, "kind": "SITE", "active": false }
      ]
    }"#
}

// ---------------------------------------------------------------------------
// NDBC
// ---------------------------------------------------------------------------

/// Realtime file, newest row first; the middle row has no water temperature.
pub(crate) fn fixture_ndbc_realtime_txt() -> &'static str {
    "#YY  MM DD hh mm WDIR WSPD GST  WVHT   DPD   APD MWD   PRES  ATMP  WTMP  DEWP  VIS PTDY  TIDE\n\
     #yr  mo dy hr mn degT m/s  m/s     m   sec   sec degT   hPa  degC  degC  degC  nmi  hPa    ft\n\
     2024 05 01 12 00 200  5.0  6.0   0.8     7   4.9 190 1015.2  18.3  19.1  14.2   MM   MM    MM\n\
     2024 05 01 11 30 190  4.0  5.0    MM    MM    MM  MM 1015.0  18.1    MM  14.0   MM   MM    MM\n\
     2024 05 01 11 00 180  4.5  5.5   0.7     6   4.8 185 1014.9  18.0  18.9  14.1   MM   MM    MM\n"
}

/// Yearly archive rows; archives use fill values such as 9999.0 for PRES.
pub(crate) fn fixture_ndbc_history_txt() -> &'static str {
    "#YY  MM DD hh mm WDIR WSPD GST  WVHT   DPD   APD MWD   PRES  ATMP  WTMP  DEWP  VIS  TIDE\n\
     #yr  mo dy hr mn degT m/s  m/s     m   sec   sec degT   hPa  degC  degC  degC  mi    ft\n\
     2021 12 31 22 50 270  7.1  9.0  1.20  8.00  5.10 265 9999.0  12.0  15.5   8.0 99.0 99.00\n\
     2021 12 31 23 00 271  7.0  8.8  1.10  8.00  5.00 260 1018.4  11.9  15.5   7.9 99.0 99.00\n"
}

pub(crate) fn fixture_ndbc_stations_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<stations created="2024-05-01T12:00:01UTC" count="2">
  <station id="41001" lat="34.724" lon="-72.317" elev="0" name="EAST HATTERAS - 150 NM East of Cape Hatteras" owner="NDBC" pgm="NDBC Meteorological/Ocean" type="buoy" met="y" currents="n" waterquality="n" dart="n"/>
  <station id="8518750" lat="40.701" lon="-74.014" name="The Battery, NY" owner="NOS" pgm="NOS/CO-OPS" type="fixed" met="y" currents="n" waterquality="n" dart="n"/>
</stations>"#
}

// ---------------------------------------------------------------------------
// CHS
// ---------------------------------------------------------------------------

/// Out of order, with one null value.
pub(crate) fn fixture_chs_data_json() -> &'static str {
    r#"[
      { "eventDate": "2023-01-01T00:02:00Z", "qcFlagCode": "1", "value": 1.15,
        "timeSeriesId": "5cebf1e33d0f4a073c4bc23f" },
      { "eventDate": "2023-01-01T00:00:00Z", "qcFlagCode": "1", "value": 1.12,
        "timeSeriesId": "5cebf1e33d0f4a073c4bc23f" },
      { "eventDate": "2023-01-01T00:01:00Z", "qcFlagCode": "4", "value": null,
        "timeSeriesId": "5cebf1e33d0f4a073c4bc23f" }
    ]"#
}

pub(crate) fn fixture_chs_stations_json() -> &'static str {
    r#"[
      { "id": "5cebf1de3d0f4a073c4bbad5", "code": "00490", "officialName": "Halifax",
        "operating": true, "latitude": 44.666667, "longitude": -63.5833, "type": "PERMANENT",
        "timeSeries": [{ "id": "5cebf1de3d0f4a073c4bbad6", "code": "wlo", "nameEn": "Water level official value" }] },
      { "id": "5cebf1e03d0f4a073c4bbd7b", "code": "01700", "officialName": "Charlottetown",
        "operating": false, "latitude": 46.23, "longitude": -63.12, "type": "TEMPORARY" }
    ]"#
}
